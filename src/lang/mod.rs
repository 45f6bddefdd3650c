use crate::error::ValidationError;

pub use self::simple::*;

mod simple;

pub trait Tokenized {
    fn form(&self) -> &str;
    fn tag(&self) -> Option<&str>;
    fn lemma(&self) -> Option<&str>;
}

pub trait Phrasal {
    type Token: Tokenized;

    fn from_tokens(tokens: Vec<Self::Token>) -> Self;

    fn tokens(&self) -> &[Self::Token];

    fn token(&self, index: usize) -> Option<&Self::Token> {
        self.tokens().get(index)
    }

    fn len(&self) -> usize {
        self.tokens().len()
    }

    fn is_empty(&self) -> bool {
        self.tokens().is_empty()
    }
}

/// Rejects sentences the model cannot take as they are. Sentences are never truncated.
pub fn validate_tokens(len: usize, max_len: usize) -> Result<(), ValidationError> {
    if len == 0 {
        Err(ValidationError::EmptySentence)
    } else if len > max_len {
        Err(ValidationError::SentenceTooLong { len, max: max_len })
    } else {
        Ok(())
    }
}
