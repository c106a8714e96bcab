mod answer;
mod audio;
mod ids;
mod question;
mod session;
mod user;
mod workbook;

pub use answer::{AnswerRecord, AnswerRecordError, AnsweredQuestion, TestResult};
pub use audio::{AudioTrack, AudioUri, AudioUriError};
pub use ids::{ParseIdError, QuestionId, TestId, UserId, WorkbookId};
pub use question::{Question, QuestionError};
pub use session::SessionState;
pub use test::{TestAssignment, TestMetadata, TestMetadataError, TestStatus};
pub use user::User;
pub use workbook::{WorkBook, WorkBookError};
