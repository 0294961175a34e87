pub mod jsonl_writer;
pub mod llm_service;
pub mod responder;

pub use jsonl_writer::{JsonlWriter, RecordSink};
pub use llm_service::LlmService;
pub use responder::{
    claim_invocation_slot, BlockingResponder, GenerationParams, InvocationSlot, ModelReply,
    Responder,
};
