//! Continuation tokens for long-running hook operations and the elapsed-time
//! progress model behind them.
//!
//! A token is the only state guaranteed to survive between `execute` and later
//! `progress`/`cancel` calls. Wire format, `/`-delimited:
//!
//! ```text
//! <subject_id>/<duration>
//! <subject_id>/<duration>/<record_namespace>/<record_name>
//! ```

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::duration::DurationSpec;
use crate::error::{FerryError, Result};
use crate::types::OperationProgress;

const SEPARATOR: char = '/';

/// Units reported for elapsed-time operations.
pub const OPERATION_UNITS: &str = "seconds";

/// Location of the side record an operation tracks its progress counter in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub namespace: String,
    pub name: String,
}

impl RecordRef {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationToken {
    Simple {
        subject_id: String,
        duration: DurationSpec,
    },
    Extended {
        subject_id: String,
        duration: DurationSpec,
        record: RecordRef,
    },
}

impl OperationToken {
    /// Build a token. Fails when a field would not survive `decode`: an empty
    /// subject or record name, or any field containing the separator.
    pub fn new(subject_id: &str, duration: DurationSpec, record: Option<RecordRef>) -> Result<Self> {
        if subject_id.is_empty() {
            return Err(FerryError::InvalidItem(
                "operation subject must not be empty".to_string(),
            ));
        }
        ensure_token_field("subject", subject_id)?;
        let token = OperationToken::Simple {
            subject_id: subject_id.to_string(),
            duration,
        };
        match record {
            Some(record) => token.with_record(record),
            None => Ok(token),
        }
    }

    /// Attach a side record, turning the token into its extended form.
    pub fn with_record(self, record: RecordRef) -> Result<Self> {
        if record.name.is_empty() {
            return Err(FerryError::InvalidItem(
                "record name must not be empty".to_string(),
            ));
        }
        ensure_token_field("record namespace", &record.namespace)?;
        ensure_token_field("record name", &record.name)?;
        let (subject_id, duration) = match self {
            OperationToken::Simple {
                subject_id,
                duration,
            }
            | OperationToken::Extended {
                subject_id,
                duration,
                ..
            } => (subject_id, duration),
        };
        Ok(OperationToken::Extended {
            subject_id,
            duration,
            record,
        })
    }

    /// Parse a token string. Only the field count and the duration are checked.
    pub fn decode(token: &str) -> Result<Self> {
        let invalid = || FerryError::InvalidOperationId(token.to_string());
        if token.is_empty() {
            return Err(invalid());
        }
        let fields: Vec<&str> = token.split(SEPARATOR).collect();
        let duration = match fields.get(1) {
            Some(raw) if fields.len() == 2 || fields.len() == 4 => {
                raw.parse::<DurationSpec>().map_err(|_| invalid())?
            }
            _ => return Err(invalid()),
        };
        let subject_id = fields[0].to_string();
        Ok(match fields.as_slice() {
            [_, _, namespace, name] => OperationToken::Extended {
                subject_id,
                duration,
                record: RecordRef::new(namespace, name),
            },
            _ => OperationToken::Simple {
                subject_id,
                duration,
            },
        })
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn subject_id(&self) -> &str {
        match self {
            OperationToken::Simple { subject_id, .. } | OperationToken::Extended { subject_id, .. } => {
                subject_id
            }
        }
    }

    pub fn duration(&self) -> &DurationSpec {
        match self {
            OperationToken::Simple { duration, .. } | OperationToken::Extended { duration, .. } => {
                duration
            }
        }
    }

    pub fn record(&self) -> Option<&RecordRef> {
        match self {
            OperationToken::Simple { .. } => None,
            OperationToken::Extended { record, .. } => Some(record),
        }
    }
}

/// Reject a value that would shift the token's field boundaries.
pub fn ensure_token_field(field: &str, value: &str) -> Result<()> {
    if value.contains(SEPARATOR) {
        return Err(FerryError::InvalidItem(format!(
            "{field} {value:?} must not contain {SEPARATOR:?}"
        )));
    }
    Ok(())
}

impl fmt::Display for OperationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationToken::Simple {
                subject_id,
                duration,
            } => write!(f, "{subject_id}{SEPARATOR}{duration}"),
            OperationToken::Extended {
                subject_id,
                duration,
                record,
            } => write!(
                f,
                "{subject_id}{SEPARATOR}{duration}{SEPARATOR}{}{SEPARATOR}{}",
                record.namespace, record.name
            ),
        }
    }
}

impl FromStr for OperationToken {
    type Err = FerryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

/// Seconds between `started` and `now`, never negative. A parent operation that
/// never recorded a start is treated as having started at the Unix epoch.
pub fn elapsed_seconds(started: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let started = started.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let delta = now.signed_duration_since(started);
    delta
        .num_microseconds()
        .map_or(f64::MAX, |us| us as f64 / 1_000_000.0)
        .max(0.0)
}

/// Completion is a pure function of wall-clock time since the parent operation began.
pub fn evaluate_progress(
    duration: &DurationSpec,
    started: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> OperationProgress {
    let elapsed = elapsed_seconds(started, now);
    let total = duration.as_secs_f64();
    let completed = elapsed >= total;
    let n_completed = if completed { total } else { elapsed };

    OperationProgress {
        completed,
        err: None,
        n_completed: n_completed as i64,
        n_total: total as i64,
        operation_units: OPERATION_UNITS.to_string(),
        description: String::new(),
        started,
        updated: now,
    }
}
