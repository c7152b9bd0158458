//! Pointer source implementations that do not need a native backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use capsync_common::error::{CapsyncError, CapsyncResult};
use capsync_platform_core::{PointerSample, PointerSource};

/// Scripted pointer source for tests and demos.
///
/// Each read pops the next scripted entry; `None` entries simulate a read
/// failure. Once the script runs out the last sample repeats.
pub struct ScriptedPointerSource {
    script: Mutex<VecDeque<Option<PointerSample>>>,
    last: Mutex<Option<PointerSample>>,
    reads: AtomicU64,
}

impl ScriptedPointerSource {
    pub fn new(script: Vec<Option<PointerSample>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            reads: AtomicU64::new(0),
        }
    }

    /// A source that always reports the same sample.
    pub fn fixed(sample: PointerSample) -> Self {
        Self::new(vec![Some(sample)])
    }

    /// Append entries to the script.
    pub fn push(&self, entry: Option<PointerSample>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
    }

    /// Number of reads served so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl PointerSource for ScriptedPointerSource {
    fn cursor_position(&self) -> CapsyncResult<PointerSample> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let next = self
            .script
            .lock()
            .map_err(|_| CapsyncError::cursor_capture("pointer script lock poisoned"))?
            .pop_front();
        let mut last = self
            .last
            .lock()
            .map_err(|_| CapsyncError::cursor_capture("pointer script lock poisoned"))?;

        match next {
            Some(Some(sample)) => {
                *last = Some(sample.clone());
                Ok(sample)
            }
            Some(None) => Err(CapsyncError::cursor_capture("scripted read failure")),
            None => last
                .clone()
                .ok_or_else(|| CapsyncError::cursor_capture("no pointer sample available")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_replays_then_repeats_last_sample() {
        let source = ScriptedPointerSource::new(vec![
            Some(PointerSample::new(1.0, 1.0)),
            None,
            Some(PointerSample::new(2.0, 2.0)),
        ]);

        assert_eq!(source.cursor_position().unwrap().x, 1.0);
        assert!(source.cursor_position().is_err());
        assert_eq!(source.cursor_position().unwrap().x, 2.0);
        assert_eq!(source.cursor_position().unwrap().x, 2.0);
        assert_eq!(source.reads(), 4);
    }

    #[test]
    fn empty_script_fails_until_pushed() {
        let source = ScriptedPointerSource::new(vec![]);
        assert!(source.cursor_position().is_err());
        source.push(Some(PointerSample::new(5.0, 6.0)));
        assert_eq!(source.cursor_position().unwrap().y, 6.0);
    }
}
