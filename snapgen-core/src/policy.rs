/*!
Tag-driven retention policy resolution.

Each instance declares how many snapshot generations to keep through the
declaration tag. The resolver turns that string into a [`Disposition`] whose
predicates the create and prune phases evaluate independently.
*/

use crate::config::RotationConfig;
use crate::model::Instance;
use crate::{Result, RotateError};

/// What one rotation run does with an instance.
///
/// Two values get special treatment as literal strings before any numeric
/// parse: an empty declaration opts the instance out of the whole run, and
/// the exact string `"0"` means "retain zero generations" (purge every
/// managed snapshot without creating a new one). Everything else that parses
/// as an unsigned integer rotates to that generation count. A declaration
/// that does not parse still gets a snapshot, but no surplus can ever be
/// computed for it, so nothing is pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Empty declaration: opted out of both phases
    Skip,
    /// Non-numeric declaration: snapshot created, instance swept, no deletions
    CreateOnly,
    /// Rotate to `keep` generations: create one snapshot, prune the surplus
    Rotate { keep: u32 },
    /// Literal `"0"`: purge all managed snapshots, create none
    PruneToZero,
}

impl Disposition {
    /// Whether the create phase snapshots this instance
    pub fn create_eligible(self) -> bool {
        matches!(self, Disposition::Rotate { .. } | Disposition::CreateOnly)
    }

    /// Whether the prune phase sweeps this instance at all
    pub fn prune_eligible(self) -> bool {
        !matches!(self, Disposition::Skip)
    }

    /// Generation count to retain, when one can be computed
    pub fn retain_target(self) -> Option<u32> {
        match self {
            Disposition::Rotate { keep } => Some(keep),
            Disposition::PruneToZero => Some(0),
            Disposition::Skip | Disposition::CreateOnly => None,
        }
    }
}

/// Classify an instance by its retention declaration.
///
/// Enumeration already filters on the declaration tag key, so a missing tag
/// here is a provider contract violation surfaced as
/// [`RotateError::MissingDeclaration`].
pub fn resolve(instance: &Instance, config: &RotationConfig) -> Result<Disposition> {
    let value = instance
        .tag(&config.declaration_tag)
        .ok_or_else(|| RotateError::missing_declaration(instance.instance_id.as_str()))?;

    Ok(match value {
        "" => Disposition::Skip,
        "0" => Disposition::PruneToZero,
        other => match other.parse::<u32>() {
            Ok(keep) => Disposition::Rotate { keep },
            Err(_) => Disposition::CreateOnly,
        },
    })
}
