use crate::agent::capture::{ProcessNamer, WindowInspector};
use crate::agent::error::MonitorError;
use crate::agent::queue::EventQueue;
use crate::util::cancel::CancelToken;
use crate::util::logging::{debug, info, trace, warn};
use chrono::Utc;
use deskwatch_core::events::{ActivityEvent, UNKNOWN_PROCESS};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOutcome {
    /// No focused window, or it has no title.
    Untitled,
    /// Same title as the previous sample.
    Unchanged,
    Emitted,
}

/// Polls the focused window and turns title changes into events.
pub struct WindowSampler {
    inspector: Box<dyn WindowInspector>,
    namer: Box<dyn ProcessNamer>,
    queue: EventQueue,
    subject: String,
    last_title: Option<String>,
}

impl WindowSampler {
    pub fn new(
        inspector: Box<dyn WindowInspector>,
        namer: Box<dyn ProcessNamer>,
        queue: EventQueue,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            inspector,
            namer,
            queue,
            subject: subject.into(),
            last_title: None,
        }
    }

    pub fn last_title(&self) -> Option<&str> {
        self.last_title.as_deref()
    }

    pub fn sample_once(&mut self) -> Result<SampleOutcome, MonitorError> {
        let window = self
            .inspector
            .foreground_window()
            .map_err(MonitorError::OsCapture)?;
        let Some(window) = window else {
            return Ok(SampleOutcome::Untitled);
        };
        if window.title.is_empty() {
            return Ok(SampleOutcome::Untitled);
        }
        if self.last_title.as_deref() == Some(window.title.as_str()) {
            return Ok(SampleOutcome::Unchanged);
        }

        let template = match self.namer.process_name(window.process_id) {
            Ok(name) => name,
            Err(e) => {
                debug!("Process name lookup for pid {} failed: {:#}", window.process_id, e);
                UNKNOWN_PROCESS.to_string()
            }
        };

        let event = ActivityEvent::new(Utc::now(), window.title.clone(), template, &self.subject);
        trace!("Focus moved to '{}' ({})", event.activity, event.template);
        // Dedupe tracks what was observed, even if the queue turns the event away.
        self.last_title = Some(window.title);
        self.queue.push(event)?;
        Ok(SampleOutcome::Emitted)
    }

    /// Samples every `interval` until `cancel` fires. Sampling errors never end the loop.
    pub fn run(&mut self, cancel: &CancelToken, interval: Duration) {
        info!(
            "Window sampler started for '{}' (interval {:?})",
            self.subject, interval
        );
        while !cancel.is_cancelled() {
            match self.sample_once() {
                Ok(_) => {}
                Err(e @ MonitorError::QueueFull { .. }) => {
                    warn!("Dropping focus change: {}", e);
                }
                Err(e) => debug!("Window sample failed: {}", e),
            }
            if cancel.wait_timeout(interval) {
                break;
            }
        }
        info!("Window sampler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::capture::ForegroundWindow;
    use crate::agent::queue::Pop;
    use anyhow::{Result, anyhow};
    use std::collections::VecDeque;

    struct ScriptedWindows(VecDeque<Result<Option<ForegroundWindow>>>);

    impl ScriptedWindows {
        fn titles(titles: &[&str]) -> Self {
            Self(
                titles
                    .iter()
                    .map(|t| {
                        Ok(Some(ForegroundWindow {
                            title: t.to_string(),
                            process_id: 42,
                        }))
                    })
                    .collect(),
            )
        }
    }

    impl WindowInspector for ScriptedWindows {
        fn foreground_window(&mut self) -> Result<Option<ForegroundWindow>> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    struct FixedName(Option<&'static str>);

    impl ProcessNamer for FixedName {
        fn process_name(&mut self, process_id: u32) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| anyhow!("pid {process_id} vanished"))
        }
    }

    fn sampler(windows: ScriptedWindows, queue: &EventQueue) -> WindowSampler {
        WindowSampler::new(
            Box::new(windows),
            Box::new(FixedName(Some("app.exe"))),
            queue.clone(),
            "alice",
        )
    }

    fn drain(queue: &EventQueue) -> Vec<ActivityEvent> {
        let mut out = Vec::new();
        while let Pop::Event(e) = queue.try_pop() {
            out.push(e);
        }
        out
    }

    #[test]
    fn consecutive_duplicates_collapse() {
        let queue = EventQueue::unbounded();
        let titles = ["Notepad", "Notepad", "Chrome", "Chrome", "Notepad"];
        let mut sampler = sampler(ScriptedWindows::titles(&titles), &queue);

        let outcomes: Vec<_> = titles
            .iter()
            .map(|_| sampler.sample_once().expect("sample"))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                SampleOutcome::Emitted,
                SampleOutcome::Unchanged,
                SampleOutcome::Emitted,
                SampleOutcome::Unchanged,
                SampleOutcome::Emitted,
            ]
        );

        let events = drain(&queue);
        let got: Vec<_> = events.iter().map(|e| e.activity.as_str()).collect();
        assert_eq!(got, vec!["Notepad", "Chrome", "Notepad"]);
        assert!(events.iter().all(|e| e.subject == "alice" && e.template == "app.exe"));
    }

    #[test]
    fn every_short_sequence_emits_exactly_its_transitions() {
        const ALPHABET: [&str; 3] = ["", "A", "B"];
        for len in 0..=6u32 {
            for code in 0..ALPHABET.len().pow(len) {
                let mut rest = code;
                let titles: Vec<&str> = (0..len)
                    .map(|_| {
                        let t = ALPHABET[rest % ALPHABET.len()];
                        rest /= ALPHABET.len();
                        t
                    })
                    .collect();

                // Untitled samples neither emit nor reset the last title.
                let mut expected: Vec<&str> = Vec::new();
                for t in titles.iter().copied().filter(|t| !t.is_empty()) {
                    if expected.last() != Some(&t) {
                        expected.push(t);
                    }
                }

                let queue = EventQueue::unbounded();
                let mut sampler = sampler(ScriptedWindows::titles(&titles), &queue);
                for _ in &titles {
                    sampler.sample_once().expect("sample");
                }
                let got: Vec<_> = drain(&queue).into_iter().map(|e| e.activity).collect();
                assert_eq!(got, expected, "titles {titles:?}");
            }
        }
    }

    #[test]
    fn empty_titles_and_missing_windows_are_ignored() {
        let queue = EventQueue::unbounded();
        let mut windows = ScriptedWindows::titles(&["", "Mail"]);
        windows.0.push_front(Ok(None));
        let mut sampler = sampler(windows, &queue);

        assert_eq!(sampler.sample_once().expect("none"), SampleOutcome::Untitled);
        assert_eq!(sampler.sample_once().expect("empty"), SampleOutcome::Untitled);
        assert_eq!(sampler.last_title(), None);
        assert_eq!(sampler.sample_once().expect("mail"), SampleOutcome::Emitted);
        assert_eq!(drain(&queue).len(), 1);
    }

    #[test]
    fn empty_title_between_repeats_does_not_split_them() {
        let queue = EventQueue::unbounded();
        let titles = ["Mail", "", "Mail"];
        let mut sampler = sampler(ScriptedWindows::titles(&titles), &queue);
        for _ in titles {
            sampler.sample_once().expect("sample");
        }
        assert_eq!(drain(&queue).len(), 1);
    }

    #[test]
    fn capture_failure_is_reported_and_leaves_state_untouched() {
        let queue = EventQueue::unbounded();
        let mut windows = ScriptedWindows::titles(&["Mail"]);
        windows.0.push_front(Err(anyhow!("display server gone")));
        let mut sampler = sampler(windows, &queue);

        let err = sampler.sample_once().expect_err("capture should fail");
        assert!(matches!(err, MonitorError::OsCapture(_)));
        assert!(queue.is_empty());
        assert_eq!(sampler.sample_once().expect("mail"), SampleOutcome::Emitted);
    }

    #[test]
    fn unknown_process_still_emits() {
        let queue = EventQueue::unbounded();
        let mut sampler = WindowSampler::new(
            Box::new(ScriptedWindows::titles(&["Orphan"])),
            Box::new(FixedName(None)),
            queue.clone(),
            "alice",
        );
        assert_eq!(sampler.sample_once().expect("sample"), SampleOutcome::Emitted);
        let events = drain(&queue);
        assert_eq!(events[0].template, UNKNOWN_PROCESS);
    }

    #[test]
    fn overflow_is_reported_but_title_is_remembered() {
        let queue = EventQueue::new(1);
        let titles = ["A", "B", "B"];
        let mut sampler = sampler(ScriptedWindows::titles(&titles), &queue);

        assert_eq!(sampler.sample_once().expect("a"), SampleOutcome::Emitted);
        let err = sampler.sample_once().expect_err("queue full");
        assert!(matches!(err, MonitorError::QueueFull { .. }));
        assert_eq!(sampler.last_title(), Some("B"));
        assert_eq!(sampler.sample_once().expect("b again"), SampleOutcome::Unchanged);
        assert_eq!(queue.overflowed(), 1);
    }

    #[test]
    fn run_survives_errors_and_stops_on_cancel() {
        let queue = EventQueue::unbounded();
        let mut windows = ScriptedWindows::titles(&["One", "Two"]);
        windows.0.push_front(Err(anyhow!("transient")));
        let mut sampler = sampler(windows, &queue);
        let cancel = CancelToken::new();

        let stopper = {
            let cancel = cancel.clone();
            let queue = queue.clone();
            std::thread::spawn(move || {
                while queue.len() < 2 {
                    std::thread::sleep(Duration::from_millis(2));
                }
                cancel.cancel();
            })
        };
        sampler.run(&cancel, Duration::from_millis(5));
        stopper.join().expect("stopper panicked");

        let got: Vec<_> = drain(&queue).into_iter().map(|e| e.activity).collect();
        assert_eq!(got, vec!["One", "Two"]);
    }
}
