use std::fmt;
use std::ops::Index;
use std::slice::Iter;

use crate::lang::{Phrasal, Tokenized};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    form: String,
    tag: Option<String>,
    lemma: Option<String>,
}

impl Token {
    pub fn new<S: Into<String>>(form: S, tag: Option<S>, lemma: Option<S>) -> Self {
        Token {
            form: form.into(),
            tag: tag.map(|s| s.into()),
            lemma: lemma.map(|s| s.into()),
        }
    }

    pub fn from_form<S: Into<String>>(form: S) -> Self {
        Token {
            form: form.into(),
            tag: None,
            lemma: None,
        }
    }

    pub fn set_tag<S: Into<String>>(&mut self, tag: S) {
        self.tag = Some(tag.into());
    }

    pub fn set_lemma<S: Into<String>>(&mut self, lemma: S) {
        self.lemma = Some(lemma.into());
    }
}

impl Tokenized for Token {
    fn form(&self) -> &str {
        &self.form
    }

    fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    fn lemma(&self) -> Option<&str> {
        self.lemma.as_deref()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.form)?;
        if let Some(ref tag) = self.tag {
            write!(f, "\t{}", tag)?;
            if let Some(ref lemma) = self.lemma {
                write!(f, "\t{}", lemma)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sentence {
    tokens: Vec<Token>,
}

impl Sentence {
    pub fn from_forms<S: AsRef<str>>(forms: &[S]) -> Self {
        Sentence {
            tokens: forms
                .iter()
                .map(|form| Token::from_form(form.as_ref()))
                .collect(),
        }
    }

    pub fn forms(&self) -> Vec<&str> {
        self.tokens.iter().map(|t| t.form()).collect()
    }

    /// Tags of every token, or `None` when any token is untagged.
    pub fn tags(&self) -> Option<Vec<&str>> {
        self.tokens.iter().map(|t| t.tag()).collect()
    }

    pub fn lemmas(&self) -> Option<Vec<&str>> {
        self.tokens.iter().map(|t| t.lemma()).collect()
    }

    pub fn iter(&self) -> Iter<Token> {
        self.tokens.iter()
    }

    pub fn tokens_mut(&mut self) -> &mut [Token] {
        &mut self.tokens
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.forms().join(" "))
    }
}

impl Phrasal for Sentence {
    type Token = Token;

    fn from_tokens(tokens: Vec<Token>) -> Self {
        Sentence { tokens }
    }

    fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

impl Index<usize> for Sentence {
    type Output = Token;

    fn index(&self, index: usize) -> &Self::Output {
        &self.tokens[index]
    }
}

impl<'a> IntoIterator for &'a Sentence {
    type Item = &'a Token;
    type IntoIter = Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}
