//! Error taxonomy for a packaging run.
//!
//! Every failure that aborts a build is one of these variants. They travel
//! through `anyhow::Result` like every other error in the crate; callers that
//! need to branch on the category use `err.downcast_ref::<BuildError>()`.

use std::path::PathBuf;

use thiserror::Error;

use crate::asset_graph::ModuleKind;

#[derive(Debug, Error)]
pub enum BuildError {
    /// A live statement references a name that is neither defined in its
    /// module, imported, nor a known global.
    #[error("unresolved name `{name}` in {module} (statement #{statement})")]
    Analysis {
        module: String,
        statement: usize,
        name: String,
    },

    /// The asset tree violates an invariant.
    #[error("invalid asset tree at {identity}: {reason}")]
    Structural { identity: String, reason: String },

    /// A sub-packager, minifier or formatter failed on an asset's content.
    #[error("{tool} failed on {kind} output of {identity}: {message}")]
    ExternalTool {
        tool: &'static str,
        identity: String,
        kind: ModuleKind,
        message: String,
    },

    /// Reading or writing a file failed.
    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    pub fn structural(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Structural {
            identity: identity.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
