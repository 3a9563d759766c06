use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Result;

// the name carried by requests that did not identify themselves
const UNKNOWN: &str = "??";

/// The partition key of all storage state.
///
/// Equality and hashing come from the name alone. Cloning is cheap, the name is shared.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct User(Arc<str>);

impl User {
    /// creates a user with the given `name`
    pub fn new(name: impl AsRef<str>) -> Self {
        User(Arc::from(name.as_ref()))
    }

    /// the sentinel used for unauthenticated requests. It is never registered in a store.
    pub fn unknown() -> Self {
        User::new(UNKNOWN)
    }

    /// returns `true` if this is the [`User::unknown`] sentinel
    pub fn is_unknown(&self) -> bool {
        &*self.0 == UNKNOWN
    }

    /// the user's name, which is also the name of the user's directory
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<String> for User {
    fn from(name: String) -> Self {
        User(Arc::from(name))
    }
}

impl From<&str> for User {
    fn from(name: &str) -> Self {
        User::new(name)
    }
}

impl From<User> for String {
    fn from(user: User) -> Self {
        user.0.to_string()
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User({})", &self.0)
    }
}

/// returns one [`User`] for every sub-directory of `root`, sorted by name.
///
/// Plain files, directories whose name is not valid UTF-8 and a directory named like the
/// unknown sentinel are skipped.
///
/// # Errors
/// returns an IO error if `root` could not be read
pub fn scan_users(root: &Path) -> Result<Vec<User>> {
    let mut users = vec![];
    for entry in fs::read_dir(root)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry in {:?}: {}", root, e);
                continue;
            }
        };
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        match name.to_str() {
            Some(UNKNOWN) => warn!("ignoring a user directory named like the unknown user"),
            Some(name) => {
                info!("Found user: {}", name);
                users.push(User::new(name));
            }
            None => warn!("skipping user directory with a non UTF-8 name: {:?}", name),
        }
    }
    users.sort();
    Ok(users)
}
