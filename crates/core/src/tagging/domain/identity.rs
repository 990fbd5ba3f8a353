use crate::shared::constants::{ANONYMOUS_NAME_PREFIX, ANONYMOUS_URL_PREFIX};

pub type TagId = i64;

/// A persisted identity (tag): either a named person or an anonymous
/// placeholder awaiting a name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: TagId,
    pub name: String,
    /// Display key, also used as the training directory name.
    pub url_name: String,
}

impl Identity {
    /// Sequence number of an anonymous identity, parsed from its name.
    ///
    /// `None` for named identities and for placeholders whose suffix is not
    /// a number.
    pub fn anonymous_index(&self) -> Option<u32> {
        self.name
            .strip_prefix(ANONYMOUS_NAME_PREFIX)?
            .trim()
            .parse()
            .ok()
    }
}

/// An identity that has not been persisted yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewIdentity {
    pub name: String,
    pub url_name: String,
}

impl NewIdentity {
    pub fn anonymous(index: u32) -> Self {
        Self {
            name: format!("{ANONYMOUS_NAME_PREFIX}{index}"),
            url_name: format!("{ANONYMOUS_URL_PREFIX}{index}"),
        }
    }
}
