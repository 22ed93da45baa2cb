//! Runnable list loading and random selection.
//!
//! The list is a plain text file, one runnable per line:
//! `name,command,arg1,arg2,...`.

use crate::error::RandRunError;
use crate::model::Runnable;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tracing::{debug, warn};

pub const FIELD_DELIMITER: char = ',';

/// Name and command are required; arguments are optional.
///
/// Older list files always carried at least one argument (three fields). Those still
/// parse; lines with only a name and a command are accepted as well.
pub const MIN_FIELDS: usize = 2;

/// Read and parse the runnable list at `path`.
pub fn load(path: &Path) -> Result<Vec<Runnable>, RandRunError> {
    let content = std::fs::read_to_string(path).map_err(|source| RandRunError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let runnables = parse(&content);
    debug!(path = %path.display(), count = runnables.len(), "loaded runnable list");
    Ok(runnables)
}

/// Parse list content, skipping lines that do not describe a runnable.
pub fn parse(content: &str) -> Vec<Runnable> {
    let mut runnables = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
        if fields.len() < MIN_FIELDS {
            warn!(line = idx + 1, content = line, "skipping line with too few fields");
            continue;
        }
        if fields[0].is_empty() || fields[1].is_empty() {
            warn!(line = idx + 1, content = line, "skipping line with empty name or command");
            continue;
        }

        runnables.push(Runnable {
            name: fields[0].to_string(),
            command: fields[1].to_string(),
            args: fields[2..].iter().map(|f| f.to_string()).collect(),
        });
    }
    runnables
}

/// Build the selection generator: fixed when a seed is given, otherwise time-derived.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    let seed = seed.unwrap_or_else(|| {
        // Low 64 bits of the nanosecond timestamp; truncation is fine for a seed.
        time::OffsetDateTime::now_utc().unix_timestamp_nanos() as u64
    });
    debug!(seed, "seeding runnable selection");
    StdRng::seed_from_u64(seed)
}

/// Pick one runnable uniformly at random.
pub fn select<'a, R: Rng + ?Sized>(
    runnables: &'a [Runnable],
    rng: &mut R,
) -> Result<&'a Runnable, RandRunError> {
    if runnables.is_empty() {
        return Err(RandRunError::EmptyRegistry);
    }
    let idx = rng.gen_range(0..runnables.len());
    Ok(&runnables[idx])
}
