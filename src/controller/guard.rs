//! 完了処理の多重実行防止
//!
//! 実行中フラグと最小間隔（デバウンス）で、連打による二重保存を防ぐ。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 無視された理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// 完了処理が実行中
    InFlight,
    /// 前回の開始から最小間隔が経っていない
    Debounced,
    /// 初期入力ステップが未完了
    InputPending,
    /// 完了すべきセクションがない（出力ステップ）
    NothingToComplete,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::InFlight => write!(f, "保存処理中"),
            IgnoreReason::Debounced => write!(f, "連続送信"),
            IgnoreReason::InputPending => write!(f, "初期入力が未完了"),
            IgnoreReason::NothingToComplete => write!(f, "全セクション完了済み"),
        }
    }
}

#[derive(Debug)]
pub struct CompletionGuard {
    in_flight: AtomicBool,
    last_started: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl CompletionGuard {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            last_started: Mutex::new(None),
            min_interval,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// 実行権を取得（PermitのDropで解放）
    pub fn try_acquire(&self) -> Result<CompletionPermit<'_>, IgnoreReason> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(IgnoreReason::InFlight);
        }

        let now = Instant::now();
        let mut last = self.last_started.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = *last {
            if now.duration_since(previous) < self.min_interval {
                self.in_flight.store(false, Ordering::Release);
                return Err(IgnoreReason::Debounced);
            }
        }
        *last = Some(now);

        Ok(CompletionPermit { guard: self })
    }
}

/// 完了処理の実行権
#[derive(Debug)]
pub struct CompletionPermit<'a> {
    guard: &'a CompletionGuard,
}

impl Drop for CompletionPermit<'_> {
    fn drop(&mut self) {
        self.guard.in_flight.store(false, Ordering::Release);
    }
}
