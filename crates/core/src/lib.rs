//! Core traits and types for the advisor response pipeline
//!
//! This crate provides foundational types used across all other crates:
//! - Capability traits for pluggable backends (LLM, STT, TTS, store, history)
//! - Instruction and retrieval types
//! - Response planning types
//! - Chat history types
//! - Pipeline stages and streaming events
//! - Shared lazily compiled text patterns
//! - Error taxonomy

pub mod conversation;
pub mod error;
pub mod events;
pub mod instruction;
pub mod llm_types;
pub mod patterns;
pub mod response;
pub mod traits;

pub use conversation::{
    is_generic_title, ChatInstance, ChatRole, ChatTurn, DEFAULT_TITLE, GENERIC_TITLES,
};
pub use error::{Error, Result};
pub use events::{PipelineEvent, PipelineStage, StageStatus};
pub use instruction::{
    Instruction, RetrievalResult, RetrievalStage, RetrievedInstruction, ScoredInstruction,
};
pub use llm_types::{GenerationConfig, Message, Role};
pub use response::{Complexity, ResponsePlan, Surface};

pub use traits::{
    Answer, AnswerGenerator, AnswerRequest, ChatHistoryStore, Embedder, InstructionStore,
    LanguageModel, Retriever, SpeechToText, SynthesizedAudio, TextToSpeech,
};
