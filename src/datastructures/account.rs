use super::client::Endpoint;

/// Read-only account views. All share the same request shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountQuery {
    Assets,
    Holdings,
    Info,
}

impl AccountQuery {
    pub fn endpoint(self) -> Endpoint {
        match self {
            AccountQuery::Assets => Endpoint::AccountAssets,
            AccountQuery::Holdings => Endpoint::AccountHoldings,
            AccountQuery::Info => Endpoint::AccountInfo,
        }
    }

    /// Extra query parameters, sent before the version and cache-buster.
    pub fn params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            AccountQuery::Holdings => &[
                ("paged", "false"),
                ("skip", "0"),
                ("take", "400"),
                ("version", "1"),
                ("spac", "false"),
            ],
            AccountQuery::Assets | AccountQuery::Info => &[],
        }
    }
}
