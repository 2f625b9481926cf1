//! Capability traits for the response pipeline
//!
//! Every external collaborator sits behind one of these so backends can be
//! swapped by configuration and replaced by mocks in tests.
//!
//! ```text
//! Language models:
//!   - LanguageModel: messages + config -> text
//!
//! Speech:
//!   - SpeechToText: audio bytes -> transcript
//!   - TextToSpeech: text + voice -> audio
//!
//! Retrieval:
//!   - Embedder: text -> vector
//!   - InstructionStore: category and similarity queries
//!   - Retriever: query -> bounded instruction set
//!
//! History:
//!   - ChatHistoryStore: append-only turns, in-place title updates
//!
//! Answering:
//!   - AnswerGenerator: the full text path, consumed by the voice orchestrator
//! ```

mod answer;
mod history;
mod llm;
mod retriever;
mod speech;

pub use answer::{Answer, AnswerGenerator, AnswerRequest};
pub use history::ChatHistoryStore;
pub use llm::LanguageModel;
pub use retriever::{Embedder, InstructionStore, Retriever};
pub use speech::{SpeechToText, SynthesizedAudio, TextToSpeech};
