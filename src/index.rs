//! ZIP code to county index.

use std::collections::BTreeMap;
use std::io::{self, Write};

use log::info;

use crate::error::Result;
use crate::record::Zip4Detail;
use crate::walker::Container;

pub const CSV_HEADER: [&str; 2] = ["ZIP Code", "County Numbers"];

/// Distinct county numbers per ZIP code.
///
/// Counties keep the order in which they were first seen. ZIP codes are
/// kept sorted, so two builds over the same input produce identical output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountyIndex {
    map: BTreeMap<String, Vec<String>>,
}

impl CountyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `county` serves `zip`. Returns `false` if it was already known.
    pub fn insert(&mut self, zip: &str, county: &str) -> bool {
        if let Some(counties) = self.map.get_mut(zip) {
            // Linear scan: a ZIP rarely spans more than a couple of counties.
            if counties.iter().any(|c| c == county) {
                return false;
            }
            counties.push(county.to_string());
            return true;
        }
        self.map.insert(zip.to_string(), vec![county.to_string()]);
        true
    }

    pub fn add(&mut self, record: &Zip4Detail) -> bool {
        self.insert(&record.zip_code, &record.county_number)
    }

    pub fn get(&self, zip: &str) -> Option<&[String]> {
        self.map.get(zip).map(Vec::as_slice)
    }

    pub fn contains(&self, zip: &str) -> bool {
        self.map.contains_key(zip)
    }

    /// Number of ZIP codes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// ZIP codes in ascending order with their counties.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.map.iter().map(|(zip, counties)| (zip.as_str(), counties.as_slice()))
    }

    /// Fold a record stream, stopping at its first error.
    pub fn try_from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Zip4Detail>>,
    {
        let mut index = Self::new();
        for record in records {
            index.add(&record?);
        }
        Ok(index)
    }

    /// Build the index from every ZIP+4 partition of a container.
    pub fn from_container(container: &Container, password: &str) -> Result<Self> {
        let index = Self::try_from_records(container.zip4_records(password)?)?;
        info!("county index holds {} ZIP codes", index.len());
        Ok(index)
    }

    /// Write `ZIP Code,County Numbers` rows, counties comma-joined.
    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        write_csv_row(&mut out, &CSV_HEADER)?;
        for (zip, counties) in self.iter() {
            write_csv_row(&mut out, &[zip, counties.join(",").as_str()])?;
        }
        out.flush()
    }
}

impl Extend<Zip4Detail> for CountyIndex {
    fn extend<I: IntoIterator<Item = Zip4Detail>>(&mut self, records: I) {
        for record in records {
            self.add(&record);
        }
    }
}

impl FromIterator<Zip4Detail> for CountyIndex {
    fn from_iter<I: IntoIterator<Item = Zip4Detail>>(records: I) -> Self {
        let mut index = Self::new();
        index.extend(records);
        index
    }
}

fn needs_quotes(field: &str) -> bool {
    field.starts_with([' ', '\t']) || field.contains([',', '"', '\r', '\n'])
}

/// Write one CSV row, quoting only the fields that need it.
pub fn write_csv_row<W: Write>(out: &mut W, fields: &[&str]) -> io::Result<()> {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        if needs_quotes(field) {
            write!(out, "\"{}\"", field.replace('"', "\"\""))?;
        } else {
            out.write_all(field.as_bytes())?;
        }
    }
    out.write_all(b"\n")
}
