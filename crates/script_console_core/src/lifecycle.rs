//! Eval / install / reset state machine.

use crate::bus::MessageArgs;
use crate::codec::{self, Endianness};
use crate::engine::{reply_code_for, ExecStatus, ScriptEngine, Watchdog};
use crate::store::{PersistedScript, ScriptStore, Storage};
use crate::types::ReplyCode;
use crate::{ConsoleConfig, ConsoleError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on the text carried back in an eval reply.
pub const MAX_REPLY_TEXT_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// A script is installed and executing.
    Running,
    /// No script; ready to accept an install.
    Clean,
    /// Unknown after an ad-hoc eval; a reset is needed before installing.
    Dirty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestartReason {
    Install,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Script stored; the host must reinitialize the engine to pick it up.
    Installed,
    Rejected(ReplyCode, String),
}

#[derive(Debug)]
pub struct ScriptLifecycle {
    state: EngineState,
    pending_restart: Option<RestartReason>,
    store: ScriptStore,
    max_eval_len: usize,
    eval_filename: String,
    watchdog_timeout: Duration,
}

impl ScriptLifecycle {
    pub fn new(config: &ConsoleConfig) -> Self {
        Self {
            state: EngineState::Running,
            pending_restart: None,
            store: ScriptStore::new(),
            max_eval_len: config.max_eval_len,
            eval_filename: config.eval_filename.clone(),
            watchdog_timeout: config.watchdog_timeout,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn max_eval_len(&self) -> usize {
        self.max_eval_len
    }

    pub fn store(&self) -> &ScriptStore {
        &self.store
    }

    /// Compiles and runs one expression. `watchdog` is `None` while a
    /// debugger has the guard suspended; the run is then unguarded.
    pub fn eval<A, E, W>(
        &mut self,
        args: &mut A,
        endianness: Endianness,
        engine: &mut E,
        mut watchdog: Option<&mut W>,
    ) -> Result<(ReplyCode, String)>
    where
        A: MessageArgs + ?Sized,
        E: ScriptEngine + ?Sized,
        W: Watchdog + ?Sized,
    {
        let len = codec::read_length_prefix(args, endianness)?;
        if len as usize > self.max_eval_len {
            tracing::warn!(len, max = self.max_eval_len, "Eval expression too long");
            if let Err(e) = codec::drain_payload(args, len as usize) {
                tracing::warn!(error = %e, "Failed to drain oversized eval payload");
            }
            return Ok((
                ReplyCode::ResourceError,
                "Eval expression too long".to_string(),
            ));
        }

        let payload = codec::read_payload(args, len as usize)?;
        let source = codec::strip_trailing_nuls(&payload);

        let compiled = engine.compile(&self.eval_filename, source);
        let outcome = if compiled.status == ExecStatus::Success {
            if let Some(watchdog) = watchdog.as_deref_mut() {
                watchdog.arm(self.watchdog_timeout);
            }
            let outcome = engine.run();
            if let Some(watchdog) = watchdog {
                watchdog.disarm();
            }
            outcome
        } else {
            compiled
        };

        self.state = EngineState::Dirty;

        let code = reply_code_for(outcome.status);
        tracing::debug!(?code, len, "Eval complete");
        Ok((code, truncate_reply_text(outcome.text)))
    }

    pub fn install<A, S>(
        &mut self,
        args: &mut A,
        endianness: Endianness,
        storage: &mut S,
    ) -> Result<InstallOutcome>
    where
        A: MessageArgs + ?Sized,
        S: Storage + ?Sized,
    {
        if self.state != EngineState::Clean {
            return Ok(InstallOutcome::Rejected(
                ReplyCode::NeedReset,
                "Reset required".to_string(),
            ));
        }

        match self.store_script(args, endianness, storage) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(error = %e, "Script installation failed");
                self.store.discard_payload(storage);
                Err(e)
            }
        }
    }

    /// Everything after the state check. Any error leaves a partially
    /// replaced script behind, which the caller discards.
    fn store_script<A, S>(
        &mut self,
        args: &mut A,
        endianness: Endianness,
        storage: &mut S,
    ) -> Result<InstallOutcome>
    where
        A: MessageArgs + ?Sized,
        S: Storage + ?Sized,
    {
        let name = args.unmarshal_string()?;
        let len = codec::read_length_prefix(args, endianness)?;
        let max = ScriptStore::max_script_len(&*storage);
        if len > max {
            tracing::error!(name = %name, len, max, "Script installation failed - too long");
            if let Err(e) = codec::drain_payload(args, len as usize) {
                tracing::warn!(error = %e, "Failed to drain oversized script payload");
            }
            return Ok(InstallOutcome::Rejected(
                ReplyCode::ResourceError,
                "Script too long".to_string(),
            ));
        }

        tracing::info!(name = %name, len, "Installing script");
        self.store.save_name(storage, &name)?;

        let mut writer = self.store.begin_payload(storage, len)?;
        codec::stream_payload(args, len as usize, |chunk| {
            writer.write(chunk).map_err(ConsoleError::from)
        })?;
        writer.commit()?;

        tracing::info!(name = %name, len, "Script successfully installed");
        self.pending_restart = Some(RestartReason::Install);
        Ok(InstallOutcome::Installed)
    }

    pub fn reset(&mut self) {
        self.state = EngineState::Clean;
        self.pending_restart = Some(RestartReason::Reset);
    }

    /// Called by the host once the engine has been reinitialized after a
    /// restart directive.
    pub fn engine_restarted(&mut self) {
        match self.pending_restart.take() {
            Some(RestartReason::Install) => self.state = EngineState::Running,
            Some(RestartReason::Reset) => self.state = EngineState::Clean,
            None => {}
        }
    }

    pub fn mark_dirty(&mut self) {
        self.state = EngineState::Dirty;
    }

    /// The script the host should load on (re)start; a clean engine runs nothing.
    pub fn startup_script<S: Storage + ?Sized>(&self, storage: &S) -> Option<PersistedScript> {
        if self.state == EngineState::Clean {
            return None;
        }
        self.store.load(storage)
    }
}

fn truncate_reply_text(mut text: String) -> String {
    if text.len() > MAX_REPLY_TEXT_LEN {
        let mut end = MAX_REPLY_TEXT_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireArgs;
    use crate::engine::ExecOutcome;
    use crate::store::{MemoryStorage, StorageError, StorageKey};
    use crate::test_support::{RecordingWatchdog, ScriptedEngine};

    fn lifecycle() -> ScriptLifecycle {
        ScriptLifecycle::new(&ConsoleConfig::default())
    }

    fn eval_args(source: &[u8]) -> WireArgs {
        WireArgs::new(Endianness::native()).push_bytes(source)
    }

    fn install_args(name: &str, script: &[u8]) -> WireArgs {
        WireArgs::new(Endianness::native())
            .push_string(name)
            .push_bytes(script)
    }

    #[test]
    fn test_eval_success_dirties_engine() {
        let mut lc = lifecycle();
        let mut engine = ScriptedEngine::returning(ExecOutcome::success("2"));
        let mut watchdog = RecordingWatchdog::default();

        let (code, text) = lc
            .eval(&mut eval_args(b"1+1"), Endianness::native(), &mut engine, Some(&mut watchdog))
            .unwrap();

        assert_eq!(code, ReplyCode::Ok);
        assert_eq!(text, "2");
        assert_eq!(lc.state(), EngineState::Dirty);
        assert_eq!(engine.compiled, vec![b"1+1".to_vec()]);
        assert_eq!(watchdog.armed, 1);
        assert_eq!(watchdog.disarmed, 1);
    }

    #[test]
    fn test_eval_strips_trailing_nuls() {
        let mut lc = lifecycle();
        let mut engine = ScriptedEngine::returning(ExecOutcome::success("3"));
        let mut watchdog = RecordingWatchdog::default();

        lc.eval(&mut eval_args(b"1+2\0"), Endianness::native(), &mut engine, Some(&mut watchdog))
            .unwrap();
        assert_eq!(engine.compiled, vec![b"1+2".to_vec()]);
    }

    #[test]
    fn test_eval_syntax_error_skips_run() {
        let mut lc = lifecycle();
        lc.reset();
        let mut engine = ScriptedEngine::failing_compile(ExecOutcome::new(
            ExecStatus::SyntaxError,
            "SyntaxError: unterminated string",
        ));
        let mut watchdog = RecordingWatchdog::default();

        let (code, text) = lc
            .eval(&mut eval_args(b"'abc"), Endianness::native(), &mut engine, Some(&mut watchdog))
            .unwrap();

        assert_eq!(code, ReplyCode::SyntaxError);
        assert_eq!(text, "SyntaxError: unterminated string");
        assert_eq!(engine.runs, 0);
        assert_eq!(watchdog.armed, 0);
        assert_eq!(lc.state(), EngineState::Dirty);
    }

    #[test]
    fn test_eval_too_long_never_reaches_engine() {
        let mut lc = lifecycle();
        let mut engine = ScriptedEngine::returning(ExecOutcome::success("unused"));
        let mut watchdog = RecordingWatchdog::default();
        let mut args = eval_args(&[b'x'; 1025]).push_u8(0x5A);

        let (code, _) = lc
            .eval(&mut args, Endianness::native(), &mut engine, Some(&mut watchdog))
            .unwrap();

        assert_eq!(code, ReplyCode::ResourceError);
        assert!(engine.compiled.is_empty());
        assert_eq!(lc.state(), EngineState::Running);
        assert_eq!(args.unmarshal_u8().unwrap(), 0x5A);
    }

    #[test]
    fn test_eval_truncated_payload_is_protocol_error() {
        let mut lc = lifecycle();
        let mut engine = ScriptedEngine::returning(ExecOutcome::success("unused"));
        let mut watchdog = RecordingWatchdog::default();
        let mut args = WireArgs::new(Endianness::native())
            .push_u32(8)
            .push_raw(b"1+");

        let err = lc
            .eval(&mut args, Endianness::native(), &mut engine, Some(&mut watchdog))
            .unwrap_err();
        assert!(matches!(err, ConsoleError::TruncatedInput { .. }));
        assert_eq!(lc.state(), EngineState::Running);
    }

    #[test]
    fn test_reply_text_is_bounded() {
        let long = "é".repeat(MAX_REPLY_TEXT_LEN);
        let truncated = truncate_reply_text(long);
        assert!(truncated.len() <= MAX_REPLY_TEXT_LEN);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_install_requires_clean_engine() {
        let mut lc = lifecycle();
        let mut storage = MemoryStorage::new(4096);

        let outcome = lc
            .install(&mut install_args("a.js", b"print('hi')"), Endianness::native(), &mut storage)
            .unwrap();

        assert_eq!(
            outcome,
            InstallOutcome::Rejected(ReplyCode::NeedReset, "Reset required".into())
        );
        assert!(!storage.contains(StorageKey::ScriptName));
        assert!(!storage.contains(StorageKey::ScriptPayload));
    }

    #[test]
    fn test_install_then_restart_runs_script() {
        let mut lc = lifecycle();
        let mut storage = MemoryStorage::new(4096);
        lc.reset();
        lc.engine_restarted();
        assert_eq!(lc.state(), EngineState::Clean);
        assert!(lc.startup_script(&storage).is_none());

        let args = install_args("a.js", b"print('hi')").with_fragment_size(4);
        let outcome = lc
            .install(&mut args.clone(), Endianness::native(), &mut storage)
            .unwrap();
        assert_eq!(outcome, InstallOutcome::Installed);

        lc.engine_restarted();
        assert_eq!(lc.state(), EngineState::Running);
        let script = lc.startup_script(&storage).unwrap();
        assert_eq!(script.name, "a.js");
        assert_eq!(script.bytes, b"print('hi')");
        assert_eq!(script.length, 11);
    }

    #[test]
    fn test_oversized_install_keeps_previous_script() {
        let mut lc = lifecycle();
        let mut storage = MemoryStorage::new(256);
        lc.reset();
        lc.install(&mut install_args("old.js", b"old()"), Endianness::native(), &mut storage)
            .unwrap();

        let huge = vec![b'x'; 1000];
        let outcome = lc
            .install(&mut install_args("new.js", &huge), Endianness::native(), &mut storage)
            .unwrap();

        assert_eq!(
            outcome,
            InstallOutcome::Rejected(ReplyCode::ResourceError, "Script too long".into())
        );
        let script = lc.store().load(&storage).unwrap();
        assert_eq!(script.name, "old.js");
        assert_eq!(script.bytes, b"old()");
    }

    #[test]
    fn test_failed_install_leaves_no_partial_script() {
        let mut lc = lifecycle();
        let mut storage = MemoryStorage::new(4096);
        lc.reset();
        storage.fail_writes_after(16);

        let err = lc
            .install(
                &mut install_args("a.js", &[b'y'; 64]).with_fragment_size(8),
                Endianness::native(),
                &mut storage,
            )
            .unwrap_err();

        assert!(matches!(err, ConsoleError::Storage(_)));
        assert!(!storage.contains(StorageKey::ScriptPayload));
        assert_eq!(lc.state(), EngineState::Clean);
    }

    #[test]
    fn test_truncated_install_leaves_no_partial_script() {
        let mut lc = lifecycle();
        let mut storage = MemoryStorage::new(4096);
        lc.reset();
        let mut args = WireArgs::new(Endianness::native())
            .push_string("a.js")
            .push_u32(100)
            .push_raw(b"only a little");

        let err = lc
            .install(&mut args, Endianness::native(), &mut storage)
            .unwrap_err();
        assert!(matches!(err, ConsoleError::TruncatedInput { .. }));
        assert!(!storage.contains(StorageKey::ScriptPayload));
    }

    fn installed_then_reset(storage: &mut MemoryStorage, name: &str, script: &[u8]) -> ScriptLifecycle {
        let mut lc = lifecycle();
        lc.reset();
        lc.install(&mut install_args(name, script), Endianness::native(), storage)
            .unwrap();
        lc.engine_restarted();
        lc.reset();
        lc.engine_restarted();
        assert_eq!(lc.state(), EngineState::Clean);
        lc
    }

    #[test]
    fn test_full_storage_name_write_discards_previous_payload() {
        let mut storage = MemoryStorage::new(57);
        let mut lc = installed_then_reset(&mut storage, "old.js", &[b'o'; 40]);
        assert_eq!(storage.free_capacity(), 3);

        let err = lc
            .install(&mut install_args("newname.js", b"x"), Endianness::native(), &mut storage)
            .unwrap_err();

        assert!(matches!(
            err,
            ConsoleError::Storage(StorageError::NoSpace { .. })
        ));
        assert!(!storage.contains(StorageKey::ScriptPayload));
        assert!(lc.store().load(&storage).is_none());
        assert!(ScriptStore::new().load(&storage).is_none());
        assert_eq!(lc.state(), EngineState::Clean);
    }

    #[test]
    fn test_truncated_name_or_length_discards_previous_payload() {
        let truncated_name = WireArgs::new(Endianness::native())
            .push_u32(10)
            .push_raw(b"ne");
        let truncated_len = WireArgs::new(Endianness::native())
            .push_string("new.js")
            .push_raw(&[1, 2]);

        for mut args in [truncated_name, truncated_len] {
            let mut storage = MemoryStorage::new(4096);
            let mut lc = installed_then_reset(&mut storage, "old.js", b"old()");

            let err = lc
                .install(&mut args, Endianness::native(), &mut storage)
                .unwrap_err();

            assert!(matches!(err, ConsoleError::TruncatedInput { .. }));
            assert!(!storage.contains(StorageKey::ScriptPayload));
            assert!(ScriptStore::new().load(&storage).is_none());
        }
    }

    #[test]
    fn test_eval_at_exact_length_limit_runs() {
        let mut lc = lifecycle();
        let mut engine = ScriptedEngine::returning(ExecOutcome::success("ok"));
        let mut watchdog = RecordingWatchdog::default();
        let source = vec![b' '; lc.max_eval_len()];

        let (code, _) = lc
            .eval(&mut eval_args(&source), Endianness::native(), &mut engine, Some(&mut watchdog))
            .unwrap();

        assert_eq!(code, ReplyCode::Ok);
        assert_eq!(engine.compiled.len(), 1);
        assert_eq!(engine.compiled[0].len(), 1024);
    }

    #[test]
    fn test_install_at_exact_size_limit() {
        let mut storage = MemoryStorage::new(4096);
        let max = ScriptStore::max_script_len(&storage) as usize;
        assert_eq!(max, 3072);

        let mut lc = lifecycle();
        lc.reset();
        let outcome = lc
            .install(
                &mut install_args("big.js", &vec![b'b'; max]),
                Endianness::native(),
                &mut storage,
            )
            .unwrap();
        assert_eq!(outcome, InstallOutcome::Installed);
        assert_eq!(lc.store().load(&storage).unwrap().length, 3072);

        let mut storage = MemoryStorage::new(4096);
        let mut lc = lifecycle();
        lc.reset();
        let outcome = lc
            .install(
                &mut install_args("big.js", &vec![b'b'; max + 1]),
                Endianness::native(),
                &mut storage,
            )
            .unwrap();
        assert_eq!(
            outcome,
            InstallOutcome::Rejected(ReplyCode::ResourceError, "Script too long".into())
        );
    }

    #[test]
    fn test_unguarded_eval_leaves_watchdog_alone() {
        let mut lc = lifecycle();
        let mut engine = ScriptedEngine::returning(ExecOutcome::success("2"));

        let no_watchdog: Option<&mut RecordingWatchdog> = None;
        let (code, _) = lc
            .eval(&mut eval_args(b"1+1"), Endianness::native(), &mut engine, no_watchdog)
            .unwrap();

        assert_eq!(code, ReplyCode::Ok);
        assert_eq!(engine.runs, 1);
    }

    #[test]
    fn test_reset_always_cleans() {
        let mut lc = lifecycle();
        lc.reset();
        assert_eq!(lc.state(), EngineState::Clean);

        let mut lc = lifecycle();
        lc.mark_dirty();
        lc.reset();
        assert_eq!(lc.state(), EngineState::Clean);
    }
}
