//! Pool member references (`node-name:port`)

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A member reference must end in a 2-5 digit port
static PORT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\d{2,5}$").expect("port suffix pattern is valid"));

/// Reference from a pool to a node on a specific port
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemberRef(String);

impl MemberRef {
    pub fn parse(raw: &str) -> Result<Self> {
        if !PORT_SUFFIX.is_match(raw) || raw.starts_with(':') {
            return Err(Error::ValidationError(format!(
                "member '{raw}' must have the form node_name:port, e.g. node01:443"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Node name component (everything before the port delimiter)
    pub fn node_name(&self) -> &str {
        self.0.rsplit_once(':').map_or(self.0.as_str(), |(node, _)| node)
    }

    pub fn port(&self) -> u16 {
        self.0
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or_default()
    }
}

/// True when `member` is a reference to `node`, i.e. starts with `<node>:`.
/// Works on raw store strings, which are not validated.
pub fn references_node(member: &str, node: &str) -> bool {
    member
        .strip_prefix(node)
        .is_some_and(|rest| rest.starts_with(':'))
}

impl TryFrom<String> for MemberRef {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        MemberRef::parse(&raw)
    }
}

impl From<MemberRef> for String {
    fn from(member: MemberRef) -> Self {
        member.0
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
