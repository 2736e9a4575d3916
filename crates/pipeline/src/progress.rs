//! 분석 진행률 추적
//!
//! lockfile 하나가 끝날 때마다(성공/실패 무관) [`Progress::advance`]를 한 번 호출합니다.
//! 10% 단위 경계를 넘을 때마다 info 로그를 한 줄 남깁니다.

use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::counter;
use tracing::info;

use syringe_core::metrics as m;

/// 로그를 남기는 진행률 단위 (%)
const STEP_PERCENT: usize = 10;

/// 완료/전체 카운터
#[derive(Debug)]
pub struct Progress {
    total: usize,
    completed: AtomicUsize,
}

impl Progress {
    /// 전체 작업 수로 생성합니다.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
        }
    }

    /// 작업 하나를 완료로 기록하고 누적 완료 수를 반환합니다.
    pub fn advance(&self, result: &'static str) -> usize {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        counter!(m::ANALYSIS_COMPLETED_TOTAL, m::LABEL_RESULT => result).increment(1);

        if self.total > 0 && step_of(done - 1, self.total) < step_of(done, self.total) {
            info!(
                completed = done,
                total = self.total,
                percent = done * 100 / self.total,
                "analysis progress"
            );
        }
        done
    }

    /// 완료된 작업 수
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// 전체 작업 수
    pub fn total(&self) -> usize {
        self.total
    }

    /// 모든 작업이 끝났는지 여부
    pub fn is_done(&self) -> bool {
        self.completed() >= self.total
    }
}

/// `done/total`이 속한 10% 구간 번호
fn step_of(done: usize, total: usize) -> usize {
    done * 100 / total / STEP_PERCENT
}
