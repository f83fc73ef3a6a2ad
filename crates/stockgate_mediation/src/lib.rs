//! Stockgate mediation pipeline.
//!
//! Sits between a chat model (or an uploaded document) and the inventory
//! store. Reads run immediately; every write is parked in the action
//! ledger until a human confirms it.
//!
//! # Components
//!
//! - [`matcher`] / [`resolver`]: deterministic catalog matching with
//!   confidence tiers
//! - [`classifier`]: READ / WRITE / rejected per role capability
//! - [`ledger`]: `PROPOSED -> CONFIRMED -> EXECUTED | FAILED`, `CANCELLED`
//! - [`orchestrator`]: two-phase model turn with tool calls
//! - [`confirmation`]: the human decision, the only path to an executor
//! - [`bom`]: document import, matching, review and submission
//!
//! # Wiring
//!
//! ```rust,ignore
//! let store = Arc::new(DbStore::open(&db_path).await?);
//! let ledger = ActionLedger::new(store.clone());
//!
//! let orchestrator = Orchestrator::new(
//!     model,
//!     store.clone(),
//!     store.clone(),
//!     store.clone(),
//!     ledger.proposer(),
//! );
//! let confirmations = ConfirmationService::new(
//!     ledger,
//!     ExecutorRegistry::with_inventory(store.clone()),
//! );
//! ```

pub mod actions;
pub mod bom;
pub mod classifier;
pub mod confirmation;
pub mod context;
pub mod db_store;
pub mod error;
pub mod executors;
pub mod ledger;
pub mod matcher;
pub mod orchestrator;
pub mod resolver;
pub mod store;
pub mod tool_log;
pub mod tools;

pub use actions::{ActionPayload, ItemRef};
pub use bom::{
    BomService, DocumentExtractor, DraftView, JsonDocumentExtractor, ModelDocumentExtractor,
    ProcessedDraft,
};
pub use classifier::{classify, Classification, OperationClass};
pub use confirmation::{ConfirmationResult, ConfirmationService};
pub use context::{Capability, RequestContext, Role};
pub use db_store::DbStore;
pub use error::{MediationError, Result};
pub use executors::{ActionExecutor, ExecutorRegistry};
pub use ledger::{ActionLedger, ExecutionReport, LedgerStore, MemoryLedgerStore, Proposer};
pub use matcher::{match_item, MatchCandidate, MatchQuery};
pub use orchestrator::{
    ChatModel, ChatRequest, ChatResponse, ModelConfig, OpenAiChatModel, Orchestrator,
    OrchestratorConfig, ToolOutcome,
};
pub use resolver::resolve_many;
pub use tool_log::ToolCallLog;
pub use tools::{ToolDefinition, ToolRegistry};
