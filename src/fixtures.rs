//! In-memory builders for tar containers, ZIP archives and fixed-width rows.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;

use crate::record::city_state::CITY_STATE_RECORD_LEN;
use crate::record::zip4::ZIP4_RECORD_LEN;
use crate::zip::AesStrength;
use crate::zip::crypto::{ZipCryptoKeys, aes_encrypt, derive_aes_keys};

const BLOCK: usize = 512;

fn octal(field: &mut [u8], value: u64) {
    let width = field.len() - 1;
    let text = format!("{value:0width$o}");
    field[..width].copy_from_slice(text.as_bytes());
    field[width] = 0;
}

fn tar_header(name: &str, size: usize, typeflag: u8) -> [u8; BLOCK] {
    let mut h = [0u8; BLOCK];
    let name = name.as_bytes();
    h[..name.len()].copy_from_slice(name);
    octal(&mut h[100..108], 0o644);
    octal(&mut h[108..116], 0);
    octal(&mut h[116..124], 0);
    octal(&mut h[124..136], size as u64);
    octal(&mut h[136..148], 1_700_000_000);
    h[148..156].fill(b' ');
    h[156] = typeflag;
    h[257..263].copy_from_slice(b"ustar\0");
    h[263..265].copy_from_slice(b"00");

    let sum: u32 = h.iter().map(|&b| u32::from(b)).sum();
    let text = format!("{sum:06o}\0 ");
    h[148..156].copy_from_slice(text.as_bytes());
    h
}

fn push_padded(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
    let pad = (BLOCK - data.len() % BLOCK) % BLOCK;
    out.extend(std::iter::repeat_n(0u8, pad));
}

/// Build an uncompressed ustar archive; names over 99 bytes use GNU `L` records.
pub fn tar_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, data) in entries {
        let short = if name.len() > 99 {
            let mut long = name.as_bytes().to_vec();
            long.push(0);
            out.extend_from_slice(&tar_header("././@LongLink", long.len(), b'L'));
            push_padded(&mut out, &long);
            &name[..99]
        } else {
            name
        };
        out.extend_from_slice(&tar_header(short, data.len(), b'0'));
        push_padded(&mut out, data);
    }
    out.extend(std::iter::repeat_n(0u8, BLOCK * 2));
    out
}

#[derive(Debug, Clone, Copy)]
pub enum Method {
    Stored,
    Deflate,
    /// Write the payload as-is under an arbitrary method id.
    Raw(u16),
}

#[derive(Debug, Clone, Copy)]
pub enum Protection {
    None,
    ZipCrypto(&'static str),
    /// Password and AE vendor version (1 or 2); always AES-256.
    Aes(&'static str, u16),
}

struct BuiltEntry {
    name: String,
    flags: u16,
    method: u16,
    crc: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    lfh_offset: u32,
    extra: Vec<u8>,
}

const MOD_TIME: u16 = 0x6a21;
const MOD_DATE: u16 = 0x5863;

/// Writes a single-disk ZIP archive with optional encryption per member.
pub struct ZipBuilder {
    out: Vec<u8>,
    entries: Vec<BuiltEntry>,
    comment: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            entries: Vec::new(),
            comment: Vec::new(),
        }
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn add(mut self, name: &str, data: &[u8], method: Method, protection: Protection) -> Self {
        let crc = crc32fast::hash(data);
        let (method_id, compressed) = match method {
            Method::Stored => (0u16, data.to_vec()),
            Method::Raw(id) => (id, data.to_vec()),
            Method::Deflate => {
                let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
                enc.write_all(data).unwrap();
                (8u16, enc.finish().unwrap())
            }
        };

        let (flags, stored_method, stored_crc, payload, extra) = match protection {
            Protection::None => (0u16, method_id, crc, compressed, Vec::new()),
            Protection::ZipCrypto(password) => {
                let mut keys = ZipCryptoKeys::new(password.as_bytes());
                let mut header: Vec<u8> = (0..11u8).map(|i| i.wrapping_mul(37) ^ 0x5c).collect();
                header.push((crc >> 24) as u8);
                let payload = header
                    .iter()
                    .chain(compressed.iter())
                    .map(|&b| keys.encrypt_byte(b))
                    .collect();
                (0x0001, method_id, crc, payload, Vec::new())
            }
            Protection::Aes(password, version) => {
                let strength = AesStrength::Aes256;
                let salt: Vec<u8> = (0..strength.salt_len() as u8)
                    .map(|i| i ^ self.entries.len() as u8)
                    .collect();
                let keys = derive_aes_keys(password.as_bytes(), &salt, strength);
                let mut body = compressed;
                let code = aes_encrypt(strength, &keys, &mut body);

                let mut payload = salt;
                payload.extend_from_slice(&keys.verifier);
                payload.extend_from_slice(&body);
                payload.extend_from_slice(&code);

                let mut extra = Vec::new();
                extra.write_u16::<LittleEndian>(0x9901).unwrap();
                extra.write_u16::<LittleEndian>(7).unwrap();
                extra.write_u16::<LittleEndian>(version).unwrap();
                extra.extend_from_slice(b"AE");
                extra.push(strength.as_u8());
                extra.write_u16::<LittleEndian>(method_id).unwrap();

                let stored_crc = if version == 2 { 0 } else { crc };
                (0x0001, 99u16, stored_crc, payload, extra)
            }
        };

        let entry = BuiltEntry {
            name: name.to_string(),
            flags,
            method: stored_method,
            crc: stored_crc,
            compressed_size: payload.len() as u32,
            uncompressed_size: data.len() as u32,
            lfh_offset: self.out.len() as u32,
            extra,
        };

        let out = &mut self.out;
        out.extend_from_slice(b"PK\x03\x04");
        out.write_u16::<LittleEndian>(20).unwrap();
        out.write_u16::<LittleEndian>(entry.flags).unwrap();
        out.write_u16::<LittleEndian>(entry.method).unwrap();
        out.write_u16::<LittleEndian>(MOD_TIME).unwrap();
        out.write_u16::<LittleEndian>(MOD_DATE).unwrap();
        out.write_u32::<LittleEndian>(entry.crc).unwrap();
        out.write_u32::<LittleEndian>(entry.compressed_size).unwrap();
        out.write_u32::<LittleEndian>(entry.uncompressed_size).unwrap();
        out.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(entry.extra.len() as u16).unwrap();
        out.extend_from_slice(entry.name.as_bytes());
        out.extend_from_slice(&entry.extra);
        out.extend_from_slice(&payload);

        self.entries.push(entry);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        let cd_offset = self.out.len() as u32;
        for entry in &self.entries {
            let out = &mut self.out;
            out.extend_from_slice(b"PK\x01\x02");
            out.write_u16::<LittleEndian>(20).unwrap();
            out.write_u16::<LittleEndian>(20).unwrap();
            out.write_u16::<LittleEndian>(entry.flags).unwrap();
            out.write_u16::<LittleEndian>(entry.method).unwrap();
            out.write_u16::<LittleEndian>(MOD_TIME).unwrap();
            out.write_u16::<LittleEndian>(MOD_DATE).unwrap();
            out.write_u32::<LittleEndian>(entry.crc).unwrap();
            out.write_u32::<LittleEndian>(entry.compressed_size).unwrap();
            out.write_u32::<LittleEndian>(entry.uncompressed_size).unwrap();
            out.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(entry.extra.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u32::<LittleEndian>(0).unwrap();
            out.write_u32::<LittleEndian>(entry.lfh_offset).unwrap();
            out.extend_from_slice(entry.name.as_bytes());
            out.extend_from_slice(&entry.extra);
        }
        let cd_size = self.out.len() as u32 - cd_offset;

        let count = self.entries.len() as u16;
        let out = &mut self.out;
        out.extend_from_slice(b"PK\x05\x06");
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(count).unwrap();
        out.write_u16::<LittleEndian>(count).unwrap();
        out.write_u32::<LittleEndian>(cd_size).unwrap();
        out.write_u32::<LittleEndian>(cd_offset).unwrap();
        out.write_u16::<LittleEndian>(self.comment.len() as u16).unwrap();
        out.extend_from_slice(&self.comment);
        self.out
    }
}

fn put(row: &mut [u8], start: usize, end: usize, value: &str) {
    let field = &mut row[start..end];
    field.fill(b' ');
    let bytes = value.as_bytes();
    let n = bytes.len().min(field.len());
    field[..n].copy_from_slice(&bytes[..n]);
}

/// Builder for a 182-byte ZIP+4 detail row.
pub struct Zip4Row {
    zip: String,
    county: String,
    state: String,
    record_type: String,
    low: String,
    high: String,
}

impl Zip4Row {
    pub fn new(zip: &str, county: &str) -> Self {
        Self {
            zip: zip.to_string(),
            county: county.to_string(),
            state: "NY".into(),
            record_type: "S".into(),
            low: "0001".into(),
            high: "0099".into(),
        }
    }

    pub fn state(mut self, state: &str) -> Self {
        self.state = state.to_string();
        self
    }

    pub fn record_type(mut self, code: &str) -> Self {
        self.record_type = code.to_string();
        self
    }

    pub fn plus4(mut self, low: &str, high: &str) -> Self {
        self.low = low.to_string();
        self.high = high.to_string();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut row = vec![b' '; ZIP4_RECORD_LEN];
        row[0] = b'D';
        put(&mut row, 1, 6, &self.zip);
        put(&mut row, 6, 16, "UPDATEKEY1");
        put(&mut row, 17, 18, &self.record_type);
        put(&mut row, 24, 52, "MAIN ST");
        put(&mut row, 140, 144, &self.low);
        put(&mut row, 144, 148, &self.high);
        put(&mut row, 157, 159, &self.state);
        put(&mut row, 159, 162, &self.county);
        row
    }
}

/// Builder for a 129-byte city/state row.
pub struct CityStateRow {
    code: u8,
    zip: String,
    city: String,
    state: String,
    county_number: String,
    county_name: String,
}

impl CityStateRow {
    pub fn new(zip: &str, city: &str) -> Self {
        Self {
            code: b'D',
            zip: zip.to_string(),
            city: city.to_string(),
            state: "NY".into(),
            county_number: "061".into(),
            county_name: "NEW YORK".into(),
        }
    }

    pub fn code(mut self, code: u8) -> Self {
        self.code = code;
        self
    }

    pub fn state(mut self, state: &str) -> Self {
        self.state = state.to_string();
        self
    }

    pub fn county(mut self, number: &str, name: &str) -> Self {
        self.county_number = number.to_string();
        self.county_name = name.to_string();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut row = vec![b' '; CITY_STATE_RECORD_LEN];
        row[0] = self.code;
        put(&mut row, 1, 6, &self.zip);
        put(&mut row, 6, 12, "X12345");
        put(&mut row, 12, 13, "P");
        put(&mut row, 13, 41, &self.city);
        put(&mut row, 41, 54, "ABBR");
        put(&mut row, 54, 55, "B");
        put(&mut row, 55, 56, "Y");
        put(&mut row, 56, 62, "X12345");
        put(&mut row, 62, 90, &self.city);
        put(&mut row, 90, 91, "Y");
        put(&mut row, 91, 92, "A");
        put(&mut row, 92, 93, "N");
        put(&mut row, 93, 99, "123456");
        put(&mut row, 99, 101, &self.state);
        put(&mut row, 101, 104, &self.county_number);
        put(&mut row, 104, 129, &self.county_name);
        row
    }
}

/// A copyright banner row of the given length.
pub fn copyright_row(len: usize) -> Vec<u8> {
    let mut row = vec![b' '; len];
    let banner = b"CCOPYRIGHT USPS";
    row[..banner.len()].copy_from_slice(banner);
    row
}
