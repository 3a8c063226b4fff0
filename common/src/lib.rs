pub mod assembler;
pub mod error;
pub mod formats;
pub mod results;
pub mod segment;
pub mod task;

pub use error::{FormatError, StructuralMismatch};
pub use formats::{adapter_for, FormatAdapter};
pub use results::{EngineStats, PreviewEntry, PreviewPair, TaskResult};
pub use segment::{Segment, SegmentKind, SegmentStatus, TranslatedSegment};
pub use task::{
    CreateTaskRequest, DisplayMode, DocumentKind, ErrorCode, GlossaryTerm, ProgressInfo, RetryTaskRequest,
    TaskConfig, TaskId, TaskInfo, TaskStatus, TranslationContext, AUTO_LANG,
};
