use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use super::provider::{create_judge, encode_image, JudgeRequest, VisionJudge};
use crate::config::JudgeConfig;
use crate::error::{Error, Result};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a verification assistant that determines if an image \
     shows evidence that a user has completed a specific activity. Be skeptical but fair.";

/// Structured result of one judge call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub verified: bool,
    /// 0..=100
    pub confidence: u8,
    /// The judge's full reply, trimmed.
    pub explanation: String,
}

/// Asks the vision judge whether a photo shows a claimed activity.
///
/// The credential is held apart from the judge and swapped with
/// [`reconfigure`](Self::reconfigure). Calls are never retried here.
pub struct VerificationGateway {
    judge: Arc<dyn VisionJudge>,
    credential: RwLock<Option<String>>,
    system_prompt: String,
    max_image_dimension: u32,
}

impl VerificationGateway {
    pub fn new(judge: Arc<dyn VisionJudge>) -> Self {
        Self {
            judge,
            credential: RwLock::new(None),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_image_dimension: 1024,
        }
    }

    pub fn from_config(config: &JudgeConfig) -> Self {
        let gateway = Self::new(Arc::from(create_judge(config)))
            .with_max_image_dimension(config.max_image_dimension);
        match &config.system_prompt {
            Some(prompt) => gateway.with_system_prompt(prompt.clone()),
            None => gateway,
        }
    }

    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn with_max_image_dimension(mut self, max_dimension: u32) -> Self {
        self.max_image_dimension = max_dimension;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.judge.provider_name()
    }

    /// Replace the judge credential. `None` or a blank key clears it.
    pub fn reconfigure(&self, credential: Option<String>) {
        let credential = credential
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let present = credential.is_some();
        match self.credential.write() {
            Ok(mut slot) => *slot = credential,
            Err(poisoned) => *poisoned.into_inner() = credential,
        }
        debug!(present, "Judge credential reconfigured");
    }

    pub fn has_credential(&self) -> bool {
        self.current_credential().is_some()
    }

    fn current_credential(&self) -> Option<String> {
        match self.credential.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Ask the judge whether the photo at `image_path` shows `activity`.
    ///
    /// Fails with `CredentialMissing` before touching the image or network
    /// when no credential is configured.
    pub fn verify(&self, image_path: &Path, activity: &str) -> Result<Verdict> {
        let api_key = self.current_credential().ok_or(Error::CredentialMissing)?;

        let image = encode_image(image_path, self.max_image_dimension)?;
        let prompt = build_prompt(activity);

        let reply = self
            .judge
            .judge(
                &api_key,
                &JudgeRequest {
                    system_prompt: &self.system_prompt,
                    prompt: &prompt,
                    image: &image,
                },
            )
            .map_err(|e| {
                warn!(provider = self.judge.provider_name(), error = %e, "Vision judge call failed");
                Error::VerificationService(format!("{:#}", e))
            })?;

        let verdict = parse_verdict(&reply);
        info!(
            provider = self.judge.provider_name(),
            verified = verdict.verified,
            confidence = verdict.confidence,
            "Photo verified"
        );
        Ok(verdict)
    }
}

fn build_prompt(activity: &str) -> String {
    format!(
        "Did the user perform this activity: {}?\nReturn:\nYES | NO\nConfidence: NN%\nOne-sentence reason.",
        activity.trim()
    )
}

/// Turn the judge's free-text reply into a [`Verdict`].
///
/// The reply must open with a `yes` or `no` token (case-insensitive, leading
/// punctuation ignored). Without a clear token the verdict is unverified with
/// zero confidence. Confidence is the first `NN%` in the reply, capped at 100.
pub fn parse_verdict(reply: &str) -> Verdict {
    let explanation = reply.trim().to_string();

    match leading_answer(&explanation) {
        Some(verified) => Verdict {
            verified,
            confidence: find_confidence(&explanation).unwrap_or(0),
            explanation,
        },
        None => Verdict {
            verified: false,
            confidence: 0,
            explanation,
        },
    }
}

fn leading_answer(text: &str) -> Option<bool> {
    let rest = text.trim_start_matches(|c: char| !c.is_alphanumeric());
    let word_end = rest
        .find(|c: char| !c.is_alphanumeric())
        .unwrap_or(rest.len());
    let (word, after) = rest.split_at(word_end);

    let answer = if word.eq_ignore_ascii_case("yes") {
        true
    } else if word.eq_ignore_ascii_case("no") {
        false
    } else {
        return None;
    };

    // Echo of the answer template, e.g. "YES | NO" or "yes/no".
    let after = after.trim_start_matches([' ', '\t']);
    if after.starts_with('|') || after.starts_with('/') {
        return None;
    }

    Some(answer)
}

fn find_confidence(text: &str) -> Option<u8> {
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'%' {
            continue;
        }
        let start = bytes[..i]
            .iter()
            .rposition(|c| !c.is_ascii_digit())
            .map_or(0, |p| p + 1);
        let digits = &text[start..i];
        if digits.is_empty() || digits.len() > 3 {
            continue;
        }
        if let Ok(n) = digits.parse::<u32>() {
            return Some(n.min(100) as u8);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{write_photo, StubJudge, KEY};
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    fn photo() -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = write_photo(dir.path());
        (dir, path)
    }

    #[test]
    fn test_negative_verdict_with_confidence() {
        let reply = "NO\nConfidence: 42%\nNo book visible.";
        let judge = StubJudge::replying(reply);
        let gateway = VerificationGateway::new(judge.clone());
        gateway.reconfigure(Some(KEY.to_string()));
        let (_dir, path) = photo();

        let verdict = gateway.verify(&path, "reading a book").unwrap();
        assert_eq!(
            verdict,
            Verdict {
                verified: false,
                confidence: 42,
                explanation: reply.to_string(),
            }
        );
        assert_eq!(judge.calls(), 1);
        let prompt = judge.last_prompt().unwrap();
        assert!(prompt.starts_with("Did the user perform this activity: reading a book?"));
    }

    #[test]
    fn test_missing_credential_makes_no_call() {
        let judge = StubJudge::replying("YES 90%");
        let gateway = VerificationGateway::new(judge.clone());
        let (_dir, path) = photo();

        let err = gateway.verify(&path, "reading a book").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialMissing);
        assert_eq!(judge.calls(), 0);

        gateway.reconfigure(Some("   ".to_string()));
        let err = gateway.verify(&path, "reading a book").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialMissing);
        assert_eq!(judge.calls(), 0);
    }

    #[test]
    fn test_reconfigure_clears_credential() {
        let judge = StubJudge::replying("YES");
        let gateway = VerificationGateway::new(judge.clone());
        gateway.reconfigure(Some(KEY.to_string()));
        assert!(gateway.has_credential());
        gateway.reconfigure(None);
        assert!(!gateway.has_credential());
    }

    #[test]
    fn test_unreadable_image_is_image_error() {
        let judge = StubJudge::replying("YES");
        let gateway = VerificationGateway::new(judge.clone());
        gateway.reconfigure(Some(KEY.to_string()));

        let err = gateway
            .verify(Path::new("/nonexistent/photo.jpg"), "reading")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImageProcessing);
        assert_eq!(judge.calls(), 0);
    }

    #[test]
    fn test_judge_failure_is_service_error() {
        let judge = StubJudge::failing("connection reset");
        let gateway = VerificationGateway::new(judge.clone());
        gateway.reconfigure(Some(KEY.to_string()));
        let (_dir, path) = photo();

        let err = gateway.verify(&path, "reading").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VerificationService);
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(judge.calls(), 1);
    }

    #[test]
    fn test_parse_positive_verdict() {
        let verdict = parse_verdict("  Yes.\nConfidence: 95%\nThe user is holding an open book.\n");
        assert!(verdict.verified);
        assert_eq!(verdict.confidence, 95);
        assert_eq!(
            verdict.explanation,
            "Yes.\nConfidence: 95%\nThe user is holding an open book."
        );
    }

    #[test]
    fn test_parse_tolerates_leading_punctuation() {
        assert!(parse_verdict("**YES** 80%").verified);
        assert!(parse_verdict("- yes, 70%").verified);
        assert!(!parse_verdict("\"No\" 10%").verified);
        assert_eq!(parse_verdict("\"No\" 10%").confidence, 10);
    }

    #[test]
    fn test_parse_requires_whole_token() {
        let verdict = parse_verdict("Yesterday's photo, 80%");
        assert!(!verdict.verified);
        assert_eq!(verdict.confidence, 0);

        let verdict = parse_verdict("Nope 5%");
        assert!(!verdict.verified);
        assert_eq!(verdict.confidence, 0);
    }

    #[test]
    fn test_parse_missing_or_ambiguous_token() {
        let verdict = parse_verdict("The image shows a desk. Confidence: 60%");
        assert!(!verdict.verified);
        assert_eq!(verdict.confidence, 0);
        assert_eq!(verdict.explanation, "The image shows a desk. Confidence: 60%");

        let verdict = parse_verdict("YES | NO\nConfidence: 50%");
        assert!(!verdict.verified);
        assert_eq!(verdict.confidence, 0);

        assert!(!parse_verdict("yes/no").verified);
        assert_eq!(parse_verdict("").explanation, "");
    }

    #[test]
    fn test_parse_confidence_edge_cases() {
        assert_eq!(parse_verdict("YES").confidence, 0);
        assert_eq!(parse_verdict("YES 150%").confidence, 100);
        assert_eq!(parse_verdict("YES 1234% then 77%").confidence, 77);
        assert_eq!(parse_verdict("YES % then 5%").confidence, 5);
    }
}
