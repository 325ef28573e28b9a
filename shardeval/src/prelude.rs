//! Common imports for shardeval usage.
//!
//! ```
//! use shardeval::prelude::*;
//! ```

pub use crate::config::{PromptMode, RunConfig};
pub use crate::errors::Error;
pub use crate::orchestrator::{ConversationOrchestrator, ExchangeOutcome};
pub use crate::record::{ConversationLogger, ExchangeRecord, JsonLinesLogger};
pub use crate::sample::{load_samples, Sample, Shard};
pub use crate::task::{Evaluation, Task, TemplateTask};

pub use shardeval_client::{
    ClientConfig, ClientError, CredentialPool, GeminiApi, GeminiConfig, GenerationClient,
    GenerationRequest, Message,
};
pub use shardeval_extraction::{AnswerExtractor, AnswerSpec, ExtractionConfig, ExtractionStrategy};
