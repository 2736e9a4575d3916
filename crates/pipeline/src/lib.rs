#![doc = include_str!("../README.md")]

pub mod creation;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod naming;
pub mod phylum;
pub mod progress;
pub mod reconcile;
pub mod registry;
pub mod syringe;
pub mod workspace;

// --- 주요 타입 re-export ---

// 오케스트레이터
pub use syringe::{PhylumSyringe, Syringe, SyringeBuilder};

// 에러
pub use error::PhylumError;

// 단계
pub use creation::create_missing;
pub use discovery::{DiscoveryOptions, DiscoveryReport, discover};
pub use dispatch::{DispatchOptions, DispatchReport, dispatch};
pub use reconcile::{Reconciliation, RegistryIndex, reconcile};
pub use registry::RepositoryRegistry;

// 이름
pub use naming::generate_name;

// 외부 클라이언트
pub use phylum::{Analyzer, PhylumCli, ProjectRegistry};

// 작업 디렉토리 / 진행률
pub use progress::Progress;
pub use workspace::{AnalysisWorkspace, ProjectDescriptor};
