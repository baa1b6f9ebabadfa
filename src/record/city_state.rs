use super::{Field, Record, Schema};
use crate::error::Result;

pub const CITY_STATE_RECORD_LEN: usize = 129;

/// Leading classification byte of a city/state row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyrightDetailCode {
    Alias,
    Copyright,
    Detail,
    Seasonal,
    PoBoxOnly,
    Split,
}

impl CopyrightDetailCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'A' => Some(Self::Alias),
            b'C' => Some(Self::Copyright),
            b'D' => Some(Self::Detail),
            b'N' => Some(Self::Seasonal),
            b'P' => Some(Self::PoBoxOnly),
            b'Z' => Some(Self::Split),
            _ => None,
        }
    }

    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Alias => b'A',
            Self::Copyright => b'C',
            Self::Detail => b'D',
            Self::Seasonal => b'N',
            Self::PoBoxOnly => b'P',
            Self::Split => b'Z',
        }
    }
}

pub mod fields {
    use super::Field;

    pub const COPYRIGHT_DETAIL_CODE: Field = Field::raw("copyright_detail_code", 0, 1);
    pub const ZIP_CODE: Field = Field::raw("zip_code", 1, 6);
    pub const CITY_STATE_KEY: Field = Field::raw("city_state_key", 6, 12);
    pub const ZIP_CLASSIFICATION_CODE: Field = Field::raw("zip_classification_code", 12, 13);
    pub const CITY_STATE_NAME: Field = Field::trimmed("city_state_name", 13, 41);
    pub const CITY_STATE_NAME_ABBREVIATION: Field =
        Field::raw("city_state_name_abbreviation", 41, 54);
    pub const CITY_STATE_NAME_FACILITY_CODE: Field =
        Field::raw("city_state_name_facility_code", 54, 55);
    pub const CITY_STATE_MAILING_NAME_INDICATOR: Field =
        Field::raw("city_state_mailing_name_indicator", 55, 56);
    pub const PREFERRED_LAST_LINE_KEY: Field = Field::raw("preferred_last_line_key", 56, 62);
    pub const PREFERRED_LAST_LINE_NAME: Field =
        Field::trimmed("preferred_last_line_name", 62, 90);
    pub const CITY_DELIVERY_INDICATOR: Field = Field::raw("city_delivery_indicator", 90, 91);
    pub const CARRIER_ROUTE_RATE_SORTATION: Field =
        Field::raw("carrier_route_rate_sortation", 91, 92);
    pub const UNIQUE_ZIP_NAME_INDICATOR: Field = Field::raw("unique_zip_name_indicator", 92, 93);
    pub const FINANCE_NUMBER: Field = Field::raw("finance_number", 93, 99);
    pub const STATE_ABBREVIATION: Field = Field::raw("state_abbreviation", 99, 101);
    pub const COUNTY_NUMBER: Field = Field::raw("county_number", 101, 104);
    pub const COUNTY_NAME: Field = Field::trimmed("county_name", 104, 129);
}

pub const CITY_STATE_SCHEMA: Schema = Schema {
    name: "city/state",
    record_len: CITY_STATE_RECORD_LEN,
    detail_code: CopyrightDetailCode::Detail.as_byte(),
    fields: &[
        fields::COPYRIGHT_DETAIL_CODE,
        fields::ZIP_CODE,
        fields::CITY_STATE_KEY,
        fields::ZIP_CLASSIFICATION_CODE,
        fields::CITY_STATE_NAME,
        fields::CITY_STATE_NAME_ABBREVIATION,
        fields::CITY_STATE_NAME_FACILITY_CODE,
        fields::CITY_STATE_MAILING_NAME_INDICATOR,
        fields::PREFERRED_LAST_LINE_KEY,
        fields::PREFERRED_LAST_LINE_NAME,
        fields::CITY_DELIVERY_INDICATOR,
        fields::CARRIER_ROUTE_RATE_SORTATION,
        fields::UNIQUE_ZIP_NAME_INDICATOR,
        fields::FINANCE_NUMBER,
        fields::STATE_ABBREVIATION,
        fields::COUNTY_NUMBER,
        fields::COUNTY_NAME,
    ],
};

/// City/state detail row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityStateDetail {
    pub copyright_detail_code: String,
    pub zip_code: String,
    pub city_state_key: String,
    pub zip_classification_code: String,
    pub city_state_name: String,
    pub city_state_name_abbreviation: String,
    pub city_state_name_facility_code: String,
    pub city_state_mailing_name_indicator: String,
    pub preferred_last_line_key: String,
    pub preferred_last_line_name: String,
    pub city_delivery_indicator: String,
    pub carrier_route_rate_sortation: String,
    pub unique_zip_name_indicator: String,
    pub finance_number: String,
    pub state_abbreviation: String,
    pub county_number: String,
    pub county_name: String,
}

impl CityStateDetail {
    pub fn code(&self) -> Option<CopyrightDetailCode> {
        self.copyright_detail_code
            .bytes()
            .next()
            .and_then(CopyrightDetailCode::from_byte)
    }

    /// Field values in schema order, for tabular output.
    pub fn values(&self) -> [&str; 17] {
        [
            &self.copyright_detail_code,
            &self.zip_code,
            &self.city_state_key,
            &self.zip_classification_code,
            &self.city_state_name,
            &self.city_state_name_abbreviation,
            &self.city_state_name_facility_code,
            &self.city_state_mailing_name_indicator,
            &self.preferred_last_line_key,
            &self.preferred_last_line_name,
            &self.city_delivery_indicator,
            &self.carrier_route_rate_sortation,
            &self.unique_zip_name_indicator,
            &self.finance_number,
            &self.state_abbreviation,
            &self.county_number,
            &self.county_name,
        ]
    }
}

impl Record for CityStateDetail {
    const SCHEMA: &'static Schema = &CITY_STATE_SCHEMA;

    fn decode(record: &[u8]) -> Result<Self> {
        Self::SCHEMA.check_len(record)?;

        Ok(Self {
            copyright_detail_code: fields::COPYRIGHT_DETAIL_CODE.slice(record)?,
            zip_code: fields::ZIP_CODE.slice(record)?,
            city_state_key: fields::CITY_STATE_KEY.slice(record)?,
            zip_classification_code: fields::ZIP_CLASSIFICATION_CODE.slice(record)?,
            city_state_name: fields::CITY_STATE_NAME.slice(record)?,
            city_state_name_abbreviation: fields::CITY_STATE_NAME_ABBREVIATION.slice(record)?,
            city_state_name_facility_code: fields::CITY_STATE_NAME_FACILITY_CODE.slice(record)?,
            city_state_mailing_name_indicator: fields::CITY_STATE_MAILING_NAME_INDICATOR
                .slice(record)?,
            preferred_last_line_key: fields::PREFERRED_LAST_LINE_KEY.slice(record)?,
            preferred_last_line_name: fields::PREFERRED_LAST_LINE_NAME.slice(record)?,
            city_delivery_indicator: fields::CITY_DELIVERY_INDICATOR.slice(record)?,
            carrier_route_rate_sortation: fields::CARRIER_ROUTE_RATE_SORTATION.slice(record)?,
            unique_zip_name_indicator: fields::UNIQUE_ZIP_NAME_INDICATOR.slice(record)?,
            finance_number: fields::FINANCE_NUMBER.slice(record)?,
            state_abbreviation: fields::STATE_ABBREVIATION.slice(record)?,
            county_number: fields::COUNTY_NUMBER.slice(record)?,
            county_name: fields::COUNTY_NAME.slice(record)?,
        })
    }
}
