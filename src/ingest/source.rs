//! Raw catalog source rows
//!
//! The catalog arrives as CSV with the affiliate network's column headers.
//! Every column except the link id is optional: a missing column or an
//! empty cell is null, never an error.

use crate::catalog::{ProductRecord, RawEpc};
use serde::Deserialize;
use std::io::Read;

/// One raw catalog row as exported by the affiliate network.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRow {
    #[serde(rename = "LINK ID")]
    pub link_id: i64,

    #[serde(rename = "ADVERTISER", default)]
    pub advertiser: Option<String>,

    #[serde(rename = "NAME", default)]
    pub name: Option<String>,

    #[serde(rename = "DESCRIPTION", default)]
    pub description: Option<String>,

    #[serde(rename = "KEYWORDS", default)]
    pub keywords: Option<String>,

    #[serde(rename = "CATEGORY", default)]
    pub category: Option<String>,

    #[serde(rename = "PROMOTION TYPE", default)]
    pub promotion_type: Option<String>,

    #[serde(rename = "SEVEN DAY EPC", default)]
    pub epc_7day: Option<String>,

    #[serde(rename = "THREE MONTH EPC", default)]
    pub epc_3month: Option<String>,

    #[serde(rename = "CLICK URL", default)]
    pub click_url: Option<String>,

    #[serde(rename = "COUPON CODE", default)]
    pub coupon_code: Option<String>,
}

impl SourceRow {
    /// Convert the raw row into a catalog record, deriving its embedding
    /// text from the labeled non-null fields.
    pub fn into_record(self) -> ProductRecord {
        let mut record = ProductRecord {
            link_id: self.link_id,
            advertiser: self.advertiser,
            name: self.name,
            description: self.description,
            keywords: self.keywords,
            category: self.category,
            promotion_type: self.promotion_type,
            epc_7day: RawEpc::from_source(self.epc_7day),
            epc_3month: RawEpc::from_source(self.epc_3month),
            click_url: self.click_url,
            coupon_code: self.coupon_code,
            embedding_text: String::new(),
        };
        record.embedding_text = record.derive_embedding_text();
        record
    }
}

/// Read all rows from a CSV source. Any malformed row fails the run.
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<SourceRow>, csv::Error> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    csv_reader.deserialize().collect()
}
