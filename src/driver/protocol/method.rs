use std::fmt;
use std::str::FromStr;

/// Built-in database operations addressable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    BulkDocs,
    Get,
    AllDocs,
    Put,
    Post,
    Remove,
    Info,
    Changes,
}

impl Method {
    pub const ALL: [Method; 8] = [
        Method::BulkDocs,
        Method::Get,
        Method::AllDocs,
        Method::Put,
        Method::Post,
        Method::Remove,
        Method::Info,
        Method::Changes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::BulkDocs => "bulkDocs",
            Method::Get => "get",
            Method::AllDocs => "allDocs",
            Method::Put => "put",
            Method::Post => "post",
            Method::Remove => "remove",
            Method::Info => "info",
            Method::Changes => "changes",
        }
    }

    /// Whether the method mutates documents
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Method::BulkDocs | Method::Put | Method::Post | Method::Remove
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = canonical_method_name(s);
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == name)
            .ok_or_else(|| s.to_string())
    }
}

/// Strip the single leading underscore clients put on internal method names,
/// so `_bulkDocs` and `bulkDocs` address the same handler.
pub fn canonical_method_name(name: &str) -> &str {
    name.strip_prefix('_').unwrap_or(name)
}
