//! Result key names
//!
//! Every result is stored under `<metric prefix><report name>`, where the
//! report name identifies the instance the dump came from.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKey {
    Status,
    ExpiryCount,
    ExpiryMemory,
    TypeCount,
    TypeMemory,
    BigKeys,
    Prefixes,
}

impl ReportKey {
    /// Aggregate keys in publish order (status excluded)
    pub const AGGREGATES: [ReportKey; 6] = [
        ReportKey::ExpiryCount,
        ReportKey::ExpiryMemory,
        ReportKey::TypeCount,
        ReportKey::TypeMemory,
        ReportKey::BigKeys,
        ReportKey::Prefixes,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            ReportKey::Status => "rdb_status_",
            ReportKey::ExpiryCount => "rdb_exp_key_count_",
            ReportKey::ExpiryMemory => "rdb_exp_key_mem_",
            ReportKey::TypeCount => "rdb_key_count_",
            ReportKey::TypeMemory => "rdb_key_Mem_",
            ReportKey::BigKeys => "rdb_bk_data_",
            ReportKey::Prefixes => "rdb_prefix_data_",
        }
    }

    pub fn key_for(self, report_name: &str) -> String {
        format!("{}{}", self.prefix(), report_name)
    }
}
