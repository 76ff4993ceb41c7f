use super::extract::Record;

/// How the observed count relates to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Unchanged,
    Increased { delta: u64 },
    Decreased { delta: u64 },
}

pub fn compare(current: u64, baseline: u64) -> Change {
    match current.cmp(&baseline) {
        std::cmp::Ordering::Equal => Change::Unchanged,
        std::cmp::Ordering::Greater => Change::Increased {
            delta: current - baseline,
        },
        std::cmp::Ordering::Less => Change::Decreased {
            delta: baseline - current,
        },
    }
}

impl Change {
    /// Signed difference `current - baseline`.
    pub fn delta(&self) -> i64 {
        match *self {
            Change::Unchanged => 0,
            Change::Increased { delta } => i64::try_from(delta).unwrap_or(i64::MAX),
            Change::Decreased { delta } => i64::try_from(delta).map_or(i64::MIN, |d| -d),
        }
    }

    /// The leading records taken to be new.
    ///
    /// This is positional: the board lists newest first, so an increase of
    /// `delta` is attributed to the first `delta` records. Nothing checks
    /// reference ids, so a reordered listing or a change larger than the
    /// visible list names the wrong titles.
    pub fn new_records<'a>(&self, records: &'a [Record]) -> &'a [Record] {
        match *self {
            Change::Increased { delta } => {
                let window = usize::try_from(delta).unwrap_or(usize::MAX);
                &records[..window.min(records.len())]
            }
            Change::Unchanged | Change::Decreased { .. } => &[],
        }
    }
}
