use std::fmt;

use super::{Field, Record, Schema};
use crate::error::Result;

pub const ZIP4_RECORD_LEN: usize = 182;

pub const ZIP4_CODE_COPYRIGHT: u8 = b'C';
pub const ZIP4_CODE_DETAIL: u8 = b'D';

pub mod fields {
    use super::Field;

    pub const ZIP_CODE: Field = Field::raw("zip_code", 1, 6);
    pub const RECORD_TYPE_CODE: Field = Field::raw("record_type_code", 17, 18);
    pub const PLUS4_LOW: Field = Field::raw("plus4_low", 140, 144);
    pub const PLUS4_HIGH: Field = Field::raw("plus4_high", 144, 148);
    pub const STATE_ABBREVIATION: Field = Field::raw("state_abbreviation", 157, 159);
    pub const COUNTY_NUMBER: Field = Field::raw("county_number", 159, 162);
}

pub const ZIP4_SCHEMA: Schema = Schema {
    name: "ZIP+4",
    record_len: ZIP4_RECORD_LEN,
    detail_code: ZIP4_CODE_DETAIL,
    fields: &[
        fields::ZIP_CODE,
        fields::RECORD_TYPE_CODE,
        fields::PLUS4_LOW,
        fields::PLUS4_HIGH,
        fields::STATE_ABBREVIATION,
        fields::COUNTY_NUMBER,
    ],
};

/// A four-character ZIP+4 add-on: two-character sector, two-character segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Zip4Number(String);

impl Zip4Number {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn sector(&self) -> &str {
        self.0.get(0..2).unwrap_or("")
    }

    pub fn segment(&self) -> &str {
        self.0.get(2..4).unwrap_or("")
    }

    /// Segment `ND` marks a non-deliverable range.
    pub fn is_deliverable(&self) -> bool {
        self.segment() != "ND"
    }
}

impl fmt::Display for Zip4Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ZIP+4 detail row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip4Detail {
    pub zip_code: String,
    pub record_type_code: String,
    pub state_abbreviation: String,
    pub county_number: String,
    pub plus4_low: Zip4Number,
    pub plus4_high: Zip4Number,
}

impl Record for Zip4Detail {
    const SCHEMA: &'static Schema = &ZIP4_SCHEMA;

    fn decode(record: &[u8]) -> Result<Self> {
        Self::SCHEMA.check_len(record)?;

        Ok(Self {
            zip_code: fields::ZIP_CODE.slice(record)?,
            record_type_code: fields::RECORD_TYPE_CODE.slice(record)?,
            state_abbreviation: fields::STATE_ABBREVIATION.slice(record)?,
            county_number: fields::COUNTY_NUMBER.slice(record)?,
            plus4_low: Zip4Number::new(fields::PLUS4_LOW.slice(record)?),
            plus4_high: Zip4Number::new(fields::PLUS4_HIGH.slice(record)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fixtures::Zip4Row;
    use proptest::prelude::*;

    #[test]
    fn decodes_documented_offsets() {
        let row = Zip4Row::new("02134", "025")
            .state("MA")
            .record_type("S")
            .plus4("00ND", "0099")
            .build();
        let detail = Zip4Detail::decode(&row).unwrap();

        assert_eq!(detail.zip_code, "02134");
        assert_eq!(detail.county_number, "025");
        assert_eq!(detail.state_abbreviation, "MA");
        assert_eq!(detail.record_type_code, "S");
        assert_eq!(detail.plus4_low.sector(), "00");
        assert_eq!(detail.plus4_low.segment(), "ND");
        assert!(!detail.plus4_low.is_deliverable());
        assert!(detail.plus4_high.is_deliverable());
    }

    #[test]
    fn numeric_fields_keep_leading_zeros_and_spaces() {
        let row = Zip4Row::new("00501", "00 ").build();
        let detail = Zip4Detail::decode(&row).unwrap();
        assert_eq!(detail.zip_code, "00501");
        assert_eq!(detail.county_number, "00 ");
    }

    #[test]
    fn wrong_length_is_malformed() {
        let mut row = Zip4Row::new("12345", "001").build();
        row.pop();
        assert_eq!(
            Zip4Detail::decode(&row).unwrap_err().kind(),
            ErrorKind::MalformedRecord
        );
    }

    proptest! {
        #[test]
        fn decode_matches_manual_slices(body in proptest::collection::vec(0x20u8..0x7f, ZIP4_RECORD_LEN - 1)) {
            let mut row = vec![ZIP4_CODE_DETAIL];
            row.extend_from_slice(&body);
            let s = String::from_utf8(row.clone()).unwrap();

            let detail = Zip4Detail::decode(&row).unwrap();
            prop_assert_eq!(&detail.zip_code, &s[1..6]);
            prop_assert_eq!(&detail.record_type_code, &s[17..18]);
            prop_assert_eq!(detail.plus4_low.as_str(), &s[140..144]);
            prop_assert_eq!(detail.plus4_high.as_str(), &s[144..148]);
            prop_assert_eq!(&detail.state_abbreviation, &s[157..159]);
            prop_assert_eq!(&detail.county_number, &s[159..162]);
        }
    }
}
