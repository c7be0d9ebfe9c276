// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{fmt, sync::Mutex};

use crate::{utils::rfc3339_timestamp, Error};

/// A failure that didn't abort the run.
#[derive(Clone, Debug, PartialEq, Eq)]
#[readonly::make]
pub struct Failure {
    /// What failed, eg. "fetch" or a provider key.
    pub scope: String,
    /// The uri, address or collector the failure is about.
    pub target: String,
    pub message: String,
    pub at: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.scope, self.target, self.message)
    }
}

/// Append-only list of failures of a collection run, reported at shutdown.
#[derive(Debug, Default)]
pub struct FailureLedger {
    entries: Mutex<Vec<Failure>>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record(
        &self,
        scope: impl Into<String>,
        target: impl Into<String>,
        message: impl fmt::Display,
    ) {
        let failure = Failure {
            scope: scope.into(),
            target: target.into(),
            message: message.to_string(),
            at: rfc3339_timestamp(),
        };
        log::debug!("Recorded failure {failure}");
        // A poisoned ledger still holds valid entries.
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push(failure);
    }

    pub fn len(&self) -> Result<usize, Error> {
        Ok(self.entries.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    pub fn entries(&self) -> Result<Vec<Failure>, Error> {
        Ok(self.entries.lock()?.clone())
    }

    pub fn drain(&self) -> Result<Vec<Failure>, Error> {
        let mut entries = self.entries.lock()?;
        Ok(entries.drain(..).collect())
    }

    /// Log every failure and clear the ledger.
    pub fn report(&self) -> Result<Vec<Failure>, Error> {
        let failures = self.drain()?;
        if failures.is_empty() {
            log::info!("Collection finished without failures");
        } else {
            log::warn!("Collection finished with {} failures:", failures.len());
            for failure in failures.iter() {
                log::warn!("{failure}");
            }
        }
        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use anyhow::Result;

    use super::*;

    #[test]
    fn records_and_drains() -> Result<()> {
        let ledger = FailureLedger::new();
        ledger.record("fetch", "https://example.com/list.json", "HTTP 404");
        ledger.record("uniswap", "collector", "Malformed upstream data");
        assert_eq!(ledger.len()?, 2);

        let entries = ledger.entries()?;
        assert_eq!(entries[0].scope, "fetch");
        assert_eq!(entries[0].message, "HTTP 404");

        let reported = ledger.report()?;
        assert_eq!(reported.len(), 2);
        assert!(ledger.is_empty()?);
        Ok(())
    }

    #[test]
    fn concurrent_records() -> Result<()> {
        let ledger = Arc::new(FailureLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                thread::spawn(move || ledger.record("test", format!("target-{i}"), "boom"))
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread doesn't panic");
        }
        assert_eq!(ledger.len()?, 8);
        Ok(())
    }
}
