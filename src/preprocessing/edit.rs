use std::fmt;
use std::str::FromStr;

/// Case change applied to the first character before the suffix edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseEdit {
    Keep,
    Lower,
    Upper,
}

/// A suffix rewrite turning a form into its lemma: adjust the case of the
/// first character, strip `strip` characters from the end and append
/// `append`.
///
/// Rules are derived from (form, lemma) pairs in training data and
/// predicted as one class per token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRule {
    case: CaseEdit,
    strip: usize,
    append: String,
}

impl EditRule {
    pub fn new<S: Into<String>>(case: CaseEdit, strip: usize, append: S) -> Self {
        EditRule {
            case,
            strip,
            append: append.into(),
        }
    }

    pub fn derive(form: &str, lemma: &str) -> Self {
        let case = match (form.chars().next(), lemma.chars().next()) {
            (Some(f), Some(l)) if f != l => {
                if f.is_uppercase() && f.to_lowercase().eq(l.to_lowercase()) && l.is_lowercase() {
                    CaseEdit::Lower
                } else if f.is_lowercase()
                    && f.to_uppercase().eq(l.to_uppercase())
                    && l.is_uppercase()
                {
                    CaseEdit::Upper
                } else {
                    CaseEdit::Keep
                }
            }
            _ => CaseEdit::Keep,
        };
        let source: Vec<char> = apply_case(case, form).chars().collect();
        let target: Vec<char> = lemma.chars().collect();
        let prefix = source
            .iter()
            .zip(target.iter())
            .take_while(|(s, t)| s == t)
            .count();
        EditRule {
            case,
            strip: source.len() - prefix,
            append: target[prefix..].iter().collect(),
        }
    }

    /// `None` when the form is shorter than the suffix to strip.
    pub fn apply(&self, form: &str) -> Option<String> {
        let source: Vec<char> = apply_case(self.case, form).chars().collect();
        if self.strip > source.len() {
            return None;
        }
        let mut lemma: String = source[..source.len() - self.strip].iter().collect();
        lemma.push_str(&self.append);
        Some(lemma)
    }

    pub fn strip(&self) -> usize {
        self.strip
    }

    pub fn append(&self) -> &str {
        &self.append
    }

    pub fn case(&self) -> CaseEdit {
        self.case
    }
}

fn apply_case(case: CaseEdit, form: &str) -> String {
    let mut chars = form.chars();
    match (case, chars.next()) {
        (CaseEdit::Lower, Some(c)) => c.to_lowercase().chain(chars).collect(),
        (CaseEdit::Upper, Some(c)) => c.to_uppercase().chain(chars).collect(),
        _ => form.to_string(),
    }
}

impl fmt::Display for EditRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let case = match self.case {
            CaseEdit::Keep => '-',
            CaseEdit::Lower => 'L',
            CaseEdit::Upper => 'U',
        };
        write!(f, "{}{}|{}", case, self.strip, self.append)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEditRuleError(String);

impl fmt::Display for ParseEditRuleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "malformed edit rule `{}`", self.0)
    }
}

impl std::error::Error for ParseEditRuleError {}

impl FromStr for EditRule {
    type Err = ParseEditRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseEditRuleError(s.to_string());
        let mut chars = s.chars();
        let case = match chars.next() {
            Some('-') => CaseEdit::Keep,
            Some('L') => CaseEdit::Lower,
            Some('U') => CaseEdit::Upper,
            _ => return Err(err()),
        };
        let rest = chars.as_str();
        let sep = rest.find('|').ok_or_else(err)?;
        let strip = rest[..sep].parse::<usize>().map_err(|_| err())?;
        Ok(EditRule {
            case,
            strip,
            append: rest[sep + 1..].to_string(),
        })
    }
}
