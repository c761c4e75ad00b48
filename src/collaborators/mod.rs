//! External collaborators of the workflow engine.
//!
//! The engine talks to the record store, topic service, synthetic
//! generator, grader and training backend only through the traits defined
//! here. LLM-backed and HTTP implementations are provided for the binary.

pub mod grader;
pub mod records;
pub mod synthetic;
pub mod topics;
pub mod training_backend;

pub use grader::{
    render_prompt, EvaluationConfig, GradeOutcome, Grader, GraderSettings, GraderType,
    JsGraderConfig, LlmJudgeConfig, LlmJudgeGrader, DEFAULT_GRADING_CONCURRENCY,
    DEFAULT_OUTPUT_SCHEMA,
};
pub use records::{
    DatasetDocument, DatasetInfo, DatasetRecord, FileRecordStore, InMemoryRecordStore,
    RecordStore, TopicHierarchyConfig,
};
pub use synthetic::{LlmSyntheticGenerator, SyntheticGenerator, SyntheticRequest};
pub use topics::{
    LlmTopicService, TopicAssignment, TopicGenerationRequest, TopicService, MAX_SAMPLE_INPUTS,
};
pub use training_backend::{HttpTrainingBackend, TrainingBackend, TrainingSubmission};
