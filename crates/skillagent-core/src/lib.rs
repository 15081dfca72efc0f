//! SkillAgent Core
//!
//! Turns a free-form learner message into structured learning artifacts:
//!
//! - [`IntentRouter`] classifies the message (with memory hints)
//! - [`SkillOrchestrator`] picks a skill, renders its prompt, calls the
//!   provider and writes the outcome back to memory
//! - [`MemoryManager`] keeps profiles, sessions and artifacts
//! - [`Agent`] ties the three together behind one call

pub mod agent;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod router;

pub use agent::{Agent, AgentInfo, AgentResponse, SkillInfo, CONVERSATION_SKILL_ID};
pub use error::{AgentError, Result};
pub use memory::{MemoryManager, INLINE_THRESHOLD_BYTES, MAX_ARTIFACT_BYTES};
pub use orchestrator::{ExecutionContext, GenerationSettings, SessionSnapshot, SkillOrchestrator};
pub use router::{apply_threshold, IntentRouter, CONFIDENCE_THRESHOLD, DEFAULT_CONFIDENCE};
