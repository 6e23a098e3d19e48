//! # Turn Driver
//!
//! Orchestrates one conversational turn: every received text chunk is appended to the
//! raw accumulator and run through an incremental tokenizer pass whose actions are
//! dispatched in order; at stream end a mandatory full re-parse from offset zero
//! reconciles the result against what was already applied.
//!
//! The driver owns all turn-scoped state. Each pass, including the side effects it
//! dispatches, completes before the next chunk is looked at.

use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::application::dispatch_log::DispatchLog;
use crate::application::executor::{ActionExecutor, FlushReport};
use crate::application::fallback::extract_fallback_actions;
use crate::application::feed::{FeedManager, FeedMode};
use crate::application::narrative::extract_narrative;
use crate::application::protocol::StreamRecord;
use crate::application::queue::PendingActionQueue;
use crate::application::tokenizer::{ActionTokenizer, ParserState};
use crate::domain::config::ParserConfig;
use crate::domain::paths::WorkDir;
use crate::domain::traits::ExecutionTarget;
use crate::domain::types::Action;
use crate::strings::{logs, messages};

/// Requests a cooperative stop of a running turn.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by [`TurnDriver::run_turn`] between lines.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop was requested. Never resolves if the handle is dropped first.
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

/// What a finished turn produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    pub narrative: String,
    /// Files written or queued, first-seen order.
    pub files: Vec<String>,
    /// Commands run or queued, first-seen order.
    pub commands: Vec<String>,
    /// Actions still waiting for the execution target.
    pub pending: usize,
    /// User-facing error when the stream aborted the turn.
    pub error: Option<String>,
    pub cancelled: bool,
    /// Description of an action left unfinished when the stream ended.
    pub truncated: Option<String>,
    /// Actions were recovered from plain code fences.
    pub used_fallback: bool,
    pub flush: Option<FlushReport>,
    pub usage: Option<Value>,
    pub data: Vec<Value>,
    pub annotations: Vec<Value>,
}

#[derive(Debug, Default)]
struct TurnState {
    raw: String,
    parser: ParserState,
    queue: PendingActionQueue,
    log: DispatchLog,
    narrative: String,
    finished: bool,
    cancelled: bool,
    error: Option<String>,
    truncated: Option<String>,
    used_fallback: bool,
    flush: Option<FlushReport>,
    usage: Option<Value>,
    data: Vec<Value>,
    annotations: Vec<Value>,
}

pub struct TurnDriver {
    executor: ActionExecutor,
    tokenizer: ActionTokenizer,
    feed: FeedManager,
    turn: TurnState,
}

impl TurnDriver {
    pub fn new(target: Arc<dyn ExecutionTarget>, work_dir: WorkDir, config: &ParserConfig) -> Self {
        Self {
            executor: ActionExecutor::new(target),
            tokenizer: ActionTokenizer::new(work_dir.clone(), config),
            feed: FeedManager::new(work_dir),
            turn: TurnState::default(),
        }
    }

    pub fn narrative(&self) -> &str {
        &self.turn.narrative
    }

    pub fn feed(&self) -> &FeedManager {
        &self.feed
    }

    pub fn raw(&self) -> &str {
        &self.turn.raw
    }

    pub fn pending(&self) -> usize {
        self.turn.queue.len()
    }

    /// Runs a whole turn over a stream of protocol lines. Used for fresh prompts and
    /// re-sent conversations alike.
    pub async fn run_turn<S>(&mut self, lines: S, mut stop: StopSignal) -> TurnOutcome
    where
        S: Stream<Item = anyhow::Result<String>>,
    {
        self.begin_turn();
        let mut lines = std::pin::pin!(lines);

        loop {
            let next = tokio::select! {
                biased;
                _ = stop.stopped() => {
                    self.cancel();
                    break;
                }
                next = lines.next() => next,
            };

            match next {
                None => break,
                Some(Ok(line)) => {
                    if !self.push_line(&line).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("{}", logs::transport_error(&e));
                    self.abort(format!("{:#}", e));
                    break;
                }
            }
        }

        self.finish().await
    }

    /// Clears every piece of turn-scoped state.
    pub fn begin_turn(&mut self) {
        self.turn = TurnState::default();
        self.feed.initialize();
        info!("{}", logs::TURN_STARTED);
    }

    /// Handles one protocol line. Returns `false` once the turn has been aborted.
    pub async fn push_line(&mut self, line: &str) -> bool {
        match StreamRecord::parse(line) {
            StreamRecord::Text(text) => self.push_text(&text).await,
            StreamRecord::Data(items) => {
                for item in &items {
                    if let Some(message) = item.get("message").and_then(Value::as_str) {
                        self.feed.add_activity(message.to_string());
                    }
                }
                self.turn.data.extend(items);
            }
            StreamRecord::Annotations(items) => self.turn.annotations.extend(items),
            StreamRecord::Error(message) => {
                warn!("{}", logs::stream_error(&message));
                self.abort(message);
            }
            finish @ StreamRecord::Finish(_) => self.turn.usage = finish.usage().cloned(),
            StreamRecord::Unknown => {}
        }
        !self.turn.finished
    }

    /// Appends a text chunk and runs one incremental pass over the accumulator.
    pub async fn push_text(&mut self, text: &str) {
        if self.turn.finished {
            return;
        }
        self.turn.raw.push_str(text);

        self.notify_target_ready().await;

        let scan = self.tokenizer.advance(&self.turn.raw, &mut self.turn.parser);
        for action in scan.actions {
            self.notify_target_ready().await;
            let status = self.executor.execute(&action, &mut self.turn.queue).await;
            mark_completed(&mut self.turn.parser, &action);
            self.turn.log.record(&action);
            self.feed.record_dispatch(&action, &status);
        }

        self.turn.narrative =
            extract_narrative(&self.turn.raw, &self.turn.parser.completed_files, false);
        self.feed.set_task(&self.turn.narrative);
        self.feed.track_parser(&self.turn.parser);
    }

    /// Flushes the pending queue if the execution target has become ready.
    pub async fn notify_target_ready(&mut self) -> Option<FlushReport> {
        if self.turn.queue.is_empty() || !self.executor.is_ready() {
            return None;
        }
        info!("{}", logs::TARGET_READY);

        let report = self.executor.flush(&mut self.turn.queue).await;
        self.feed.record_flush(&report);
        match self.turn.flush.as_mut() {
            Some(total) => total.absorb(report.clone()),
            None => self.turn.flush = Some(report.clone()),
        }
        Some(report)
    }

    /// Stops the turn. Work already dispatched is kept; the final re-parse is skipped.
    pub fn cancel(&mut self) {
        if self.turn.finished {
            return;
        }
        info!("{}", logs::TURN_CANCELLED);
        self.turn.cancelled = true;
        self.turn.finished = true;
        self.feed.add_activity(messages::STOPPED.to_string());
        self.feed.finalize(FeedMode::Stopped);
    }

    fn abort(&mut self, message: String) {
        self.turn.error = Some(messages::stream_failed(&message));
        self.turn.finished = true;
        self.feed.finalize(FeedMode::Failed);
    }

    /// Ends the turn: runs the final re-parse unless the turn was stopped or aborted.
    pub async fn finish(&mut self) -> TurnOutcome {
        if !self.turn.finished {
            self.notify_target_ready().await;
            self.final_pass().await;
            self.turn.finished = true;
            self.feed.finalize(FeedMode::Final);
        }

        let turn = &self.turn;
        info!(
            "{}",
            logs::turn_finished(
                turn.parser.completed_files.len(),
                turn.parser.completed_commands.len(),
                turn.queue.len()
            )
        );

        TurnOutcome {
            narrative: turn.narrative.clone(),
            files: turn.parser.completed_files.clone(),
            commands: turn.parser.completed_commands.clone(),
            pending: turn.queue.len(),
            error: turn.error.clone(),
            cancelled: turn.cancelled,
            truncated: turn.truncated.clone(),
            used_fallback: turn.used_fallback,
            flush: turn.flush.clone(),
            usage: turn.usage.clone(),
            data: turn.data.clone(),
            annotations: turn.annotations.clone(),
        }
    }

    async fn final_pass(&mut self) {
        self.turn.parser.reset_for_final();

        let mut actions = Vec::new();
        loop {
            let scan = self.tokenizer.advance(&self.turn.raw, &mut self.turn.parser);
            actions.extend(scan.actions);
            if !scan.hit_limit {
                break;
            }
        }

        if let Some((kind, path)) = self.turn.parser.discard_open_action() {
            let label = match path {
                Some(path) => format!("{} {}", kind.as_str(), self.tokenizer.work_dir().display(&path)),
                None => kind.as_str().to_string(),
            };
            warn!("{}", logs::truncated_action(&label));
            self.feed.add_activity(messages::truncated(&label));
            self.turn.truncated = Some(label);
        }

        let mut skipped = 0;
        for (ordinal, action) in actions.iter().enumerate() {
            mark_completed(&mut self.turn.parser, action);
            if self.turn.log.is_handled(ordinal, action) {
                skipped += 1;
                continue;
            }
            if let Action::File { path, .. } = action {
                info!("{}", logs::final_rewrite(path));
            }
            self.dispatch_final(action).await;
        }
        info!("{}", logs::final_pass(actions.len(), skipped));

        if self.turn.parser.recognized_tags == 0 {
            let recovered = extract_fallback_actions(&self.turn.raw, self.tokenizer.work_dir());
            if !recovered.is_empty() {
                info!("{}", logs::fallback_used(recovered.len()));
                self.feed.add_activity(messages::recovered_from_fences(recovered.len()));
                self.turn.used_fallback = true;
            }
            for action in &recovered {
                mark_completed(&mut self.turn.parser, action);
                if self.turn.log.is_handled(usize::MAX, action) {
                    continue;
                }
                self.dispatch_final(action).await;
            }
        }

        self.turn.narrative =
            extract_narrative(&self.turn.raw, &self.turn.parser.completed_files, true);
        self.feed.set_task(&self.turn.narrative);
    }

    async fn dispatch_final(&mut self, action: &Action) {
        self.notify_target_ready().await;
        let status = self.executor.execute(action, &mut self.turn.queue).await;
        self.turn.log.remember(action);
        self.feed.record_dispatch(action, &status);
    }
}

fn mark_completed(parser: &mut ParserState, action: &Action) {
    match action {
        Action::File { path, .. } => {
            parser.mark_file_completed(path);
        }
        Action::Shell { command } => {
            parser.mark_command_completed(command);
        }
        Action::Directory { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{Call, RecordingTarget};

    fn driver(target: Arc<RecordingTarget>) -> TurnDriver {
        TurnDriver::new(target, WorkDir::default(), &ParserConfig::default())
    }

    const RESPONSE: &str = concat!(
        "Setting things up.\n",
        "<boltArtifact id=\"app\" title=\"Todo App\">\n",
        "<boltAction type=\"directory\" dirPath=\"components\" />\n",
        "<boltAction type=\"file\" filePath=\"/home/project/components/Foo.tsx\">\n",
        "export const Foo = () => &lt;div /&gt;;\n",
        "</boltAction>\n",
        "<boltAction type=\"shell\">npm install</boltAction>\n",
        "<boltAction type=\"file\" filePath=\"./src/App.tsx\">app</boltAction>\n",
        "</boltArtifact>\n",
        "Run it with npm run dev.",
    );

    fn expected_calls() -> Vec<Call> {
        vec![
            Call::Mkdir("/home/project/components".into()),
            Call::Write(
                "/home/project/components/Foo.tsx".into(),
                "export const Foo = () => <div />;".into(),
            ),
            Call::Run("npm install".into()),
            Call::Write("/home/project/src/App.tsx".into(), "app".into()),
        ]
    }

    async fn run_chunked(text: &str, size: usize) -> (Vec<Call>, TurnOutcome) {
        let target = RecordingTarget::ready();
        let mut driver = driver(target.clone());
        driver.begin_turn();
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(size) {
            driver.push_text(&chunk.iter().collect::<String>()).await;
        }
        let outcome = driver.finish().await;
        (target.calls(), outcome)
    }

    #[tokio::test]
    async fn test_two_chunk_example() {
        let target = RecordingTarget::ready();
        let mut driver = driver(target.clone());
        driver.begin_turn();
        driver
            .push_text("Here is your app.\n<boltAction type=\"file\" filePath=\"src/App.tsx\">export default")
            .await;
        assert_eq!(driver.narrative(), "Here is your app.");
        assert!(target.calls().is_empty());

        driver.push_text(" function App(){return null}</boltAction>").await;
        let outcome = driver.finish().await;

        assert_eq!(outcome.narrative, "Here is your app.");
        assert_eq!(outcome.files, vec!["/home/project/src/App.tsx"]);
        assert_eq!(
            target.calls(),
            vec![Call::Write(
                "/home/project/src/App.tsx".into(),
                "export default function App(){return null}".into()
            )]
        );
    }

    #[tokio::test]
    async fn test_final_pass_does_not_double_dispatch() {
        let (calls, outcome) = run_chunked(RESPONSE, RESPONSE.len()).await;
        assert_eq!(calls, expected_calls());
        assert_eq!(outcome.narrative, "Todo App");
        assert_eq!(
            outcome.files,
            vec!["/home/project/components/Foo.tsx", "/home/project/src/App.tsx"]
        );
        assert_eq!(outcome.commands, vec!["npm install"]);
        assert_eq!(outcome.truncated, None);
        assert!(!outcome.used_fallback);
    }

    #[tokio::test]
    async fn test_chunking_invariance() {
        for size in [1, 2, 3, 5, 8, 13, 64] {
            let (calls, outcome) = run_chunked(RESPONSE, size).await;
            assert_eq!(calls, expected_calls(), "chunk size {}", size);
            assert_eq!(outcome.commands, vec!["npm install"], "chunk size {}", size);
        }
    }

    #[tokio::test]
    async fn test_queue_then_flush_keeps_order() {
        let target = RecordingTarget::unavailable();
        let mut driver = driver(target.clone());
        driver.begin_turn();
        driver
            .push_text(concat!(
                "<boltAction type=\"directory\" dirPath=\"components\">",
                "<boltAction type=\"directory\" dirPath=\"components\">",
                "<boltAction type=\"file\" filePath=\"components/Foo.tsx\">foo</boltAction>",
            ))
            .await;
        assert!(target.calls().is_empty());
        assert_eq!(driver.pending(), 3);

        target.set_ready(true);
        let report = driver.notify_target_ready().await.unwrap();
        assert_eq!(report.first_file.as_deref(), Some("/home/project/components/Foo.tsx"));
        assert_eq!(driver.pending(), 0);
        assert!(driver.notify_target_ready().await.is_none());

        let outcome = driver.finish().await;
        assert_eq!(
            target.calls(),
            vec![
                Call::Mkdir("/home/project/components".into()),
                Call::Mkdir("/home/project/components".into()),
                Call::Write("/home/project/components/Foo.tsx".into(), "foo".into()),
            ]
        );
        assert_eq!(outcome.flush.map(|f| f.applied), Some(3));
    }

    #[tokio::test]
    async fn test_queue_matches_direct_dispatch() {
        let (direct, _) = run_chunked(RESPONSE, 7).await;

        let target = RecordingTarget::unavailable();
        let mut driver = driver(target.clone());
        driver.begin_turn();
        driver.push_text(RESPONSE).await;
        target.set_ready(true);
        let outcome = driver.finish().await;

        let mut queued = target.calls();
        let mut direct = direct;
        queued.sort_by_key(|c| format!("{:?}", c));
        direct.sort_by_key(|c| format!("{:?}", c));
        assert_eq!(queued, direct);
        assert_eq!(outcome.pending, 0);
    }

    #[tokio::test]
    async fn test_readiness_flushes_before_next_pass() {
        let target = RecordingTarget::unavailable();
        let mut driver = driver(target.clone());
        driver.begin_turn();
        driver
            .push_text("<boltAction type=\"directory\" dirPath=\"src\" />")
            .await;
        target.set_ready(true);
        driver
            .push_text("<boltAction type=\"file\" filePath=\"src/a.ts\">a</boltAction>")
            .await;
        assert_eq!(
            target.calls(),
            vec![
                Call::Mkdir("/home/project/src".into()),
                Call::Write("/home/project/src/a.ts".into(), "a".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_target_ready_mid_pass_keeps_order() {
        let target = RecordingTarget::booting(1);
        let mut driver = driver(target.clone());
        driver.begin_turn();
        driver
            .push_text(concat!(
                "<boltAction type=\"directory\" dirPath=\"components\" />",
                "<boltAction type=\"file\" filePath=\"components/Foo.tsx\">foo</boltAction>",
            ))
            .await;

        assert_eq!(
            target.calls(),
            vec![
                Call::Mkdir("/home/project/components".into()),
                Call::Write("/home/project/components/Foo.tsx".into(), "foo".into()),
            ]
        );
        assert_eq!(driver.pending(), 0);

        let outcome = driver.finish().await;
        assert_eq!(target.calls().len(), 2);
        assert_eq!(outcome.flush.map(|f| f.applied), Some(1));
    }

    #[tokio::test]
    async fn test_final_pass_rewrites_changed_file() {
        let target = RecordingTarget::ready();
        let mut driver = driver(target.clone());
        driver.begin_turn();
        driver
            .push_text("<boltAction type=\"file\" filePath=\"a.ts\">full body</boltAction>")
            .await;
        // Pretend the incremental pass had written a mis-split body.
        driver.turn.log = DispatchLog::new();
        driver.turn.log.record(&Action::file("/home/project/a.ts", "full"));

        driver.finish().await;
        assert_eq!(
            target.calls(),
            vec![
                Call::Write("/home/project/a.ts".into(), "full body".into()),
                Call::Write("/home/project/a.ts".into(), "full body".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_fallback_bash_block() {
        let (calls, outcome) = run_chunked("Install deps:\n\n```bash\nnpm install\n```\n", 4).await;
        assert_eq!(calls, vec![Call::Run("npm install".into())]);
        assert_eq!(outcome.commands, vec!["npm install"]);
        assert!(outcome.files.is_empty());
        assert!(outcome.used_fallback);
    }

    #[tokio::test]
    async fn test_fallback_not_used_when_tags_present() {
        let text = "<boltAction type=\"shell\">ls</boltAction>\n```bash\nnpm install\n```";
        let (calls, outcome) = run_chunked(text, 10).await;
        assert_eq!(calls, vec![Call::Run("ls".into())]);
        assert!(!outcome.used_fallback);
    }

    #[tokio::test]
    async fn test_truncated_action_is_dropped() {
        let text = "Working.\n<boltAction type=\"file\" filePath=\"src/big.ts\">export const";
        let (calls, outcome) = run_chunked(text, 9).await;
        assert!(calls.is_empty());
        assert_eq!(outcome.truncated.as_deref(), Some("file src/big.ts"));
        assert!(outcome.files.is_empty());
    }

    fn lines(items: &[String]) -> impl Stream<Item = anyhow::Result<String>> {
        futures::stream::iter(items.iter().cloned().map(Ok).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn test_run_turn_over_protocol_lines() {
        let target = RecordingTarget::ready();
        let mut driver = driver(target.clone());
        let (_handle, signal) = stop_channel();
        let items = vec![
            StreamRecord::text_line("Sure.\n<boltAction type=\"shell\">"),
            r#"2:[{"type":"progress","message":"Generating"}]"#.to_string(),
            StreamRecord::text_line("npm test</boltAction>"),
            r#"8:[{"chatSummary":"done"}]"#.to_string(),
            r#"e:{"finishReason":"stop","usage":{"completionTokens":5}}"#.to_string(),
        ];

        let outcome = driver.run_turn(lines(&items), signal).await;
        assert_eq!(target.calls(), vec![Call::Run("npm test".into())]);
        assert_eq!(outcome.narrative, "Sure.");
        assert_eq!(outcome.usage, Some(serde_json::json!({"completionTokens": 5})));
        assert_eq!(outcome.annotations.len(), 1);
        assert_eq!(outcome.data.len(), 1);
        assert_eq!(driver.feed().mode(), FeedMode::Final);
    }

    #[tokio::test]
    async fn test_error_line_aborts_turn() {
        let target = RecordingTarget::ready();
        let mut driver = driver(target.clone());
        let (_handle, signal) = stop_channel();
        let items = vec![
            StreamRecord::text_line("<boltAction type=\"shell\">ls</boltAction>"),
            r#"3:"model overloaded""#.to_string(),
            StreamRecord::text_line("<boltAction type=\"shell\">rm -rf dist</boltAction>"),
        ];

        let outcome = driver.run_turn(lines(&items), signal).await;
        assert_eq!(target.calls(), vec![Call::Run("ls".into())]);
        assert!(outcome.error.unwrap().contains("model overloaded"));
        assert!(!driver.raw().contains("rm -rf"));
        assert_eq!(driver.feed().mode(), FeedMode::Failed);
    }

    #[tokio::test]
    async fn test_transport_error_aborts_turn() {
        let target = RecordingTarget::ready();
        let mut driver = driver(target.clone());
        let (_handle, signal) = stop_channel();
        let items: Vec<anyhow::Result<String>> = vec![
            Ok(StreamRecord::text_line("partial")),
            Err(anyhow::anyhow!("connection reset")),
        ];

        let outcome = driver.run_turn(futures::stream::iter(items), signal).await;
        assert!(outcome.error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_stop_cancels_turn() {
        let target = RecordingTarget::ready();
        let mut driver = driver(target.clone());
        let (handle, signal) = stop_channel();
        handle.stop();
        assert!(signal.is_stopped());

        let items = vec![StreamRecord::text_line("<boltAction type=\"shell\">ls</boltAction>")];
        let outcome = driver.run_turn(lines(&items), signal).await;
        assert!(outcome.cancelled);
        assert!(target.calls().is_empty());
        assert_eq!(driver.feed().mode(), FeedMode::Stopped);
    }

    #[tokio::test]
    async fn test_cancel_keeps_dispatched_work() {
        let target = RecordingTarget::ready();
        let mut driver = driver(target.clone());
        driver.begin_turn();
        driver.push_text("<boltAction type=\"shell\">ls</boltAction>").await;
        driver.cancel();
        driver.push_text("<boltAction type=\"shell\">pwd</boltAction>").await;
        let outcome = driver.finish().await;

        assert!(outcome.cancelled);
        assert_eq!(target.calls(), vec![Call::Run("ls".into())]);
        assert_eq!(outcome.commands, vec!["ls"]);
    }

    #[tokio::test]
    async fn test_begin_turn_resets_state() {
        let target = RecordingTarget::unavailable();
        let mut driver = driver(target.clone());
        driver.begin_turn();
        driver.push_text("<boltAction type=\"shell\">ls</boltAction>").await;
        assert_eq!(driver.pending(), 1);

        driver.begin_turn();
        assert_eq!(driver.pending(), 0);
        assert!(driver.raw().is_empty());
        let outcome = driver.finish().await;
        assert!(outcome.commands.is_empty());
        assert_eq!(outcome.narrative, "");
    }
}
