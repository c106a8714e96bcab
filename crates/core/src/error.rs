use thiserror::Error;

use crate::model::{
    AnswerRecordError, AudioUriError, QuestionError, TestMetadataError, WorkBookError,
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    WorkBook(#[from] WorkBookError),
    #[error(transparent)]
    AudioUri(#[from] AudioUriError),
    #[error(transparent)]
    TestMetadata(#[from] TestMetadataError),
    #[error(transparent)]
    AnswerRecord(#[from] AnswerRecordError),
}
