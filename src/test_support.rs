//! Shared fixtures for unit tests.

use anyhow::anyhow;
use image::{ImageBuffer, Rgb};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::llm::{JudgeRequest, VisionJudge};

pub const KEY: &str = "sk-test-0123456789abcdef";

/// Judge stub that counts calls and replays a canned reply.
pub struct StubJudge {
    reply: Result<String, String>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl StubJudge {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

impl VisionJudge for StubJudge {
    fn judge(&self, api_key: &str, request: &JudgeRequest<'_>) -> anyhow::Result<String> {
        assert_eq!(api_key, KEY);
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(request.prompt.to_string());
        self.reply.clone().map_err(|e| anyhow!(e))
    }

    fn provider_name(&self) -> &'static str {
        "stub"
    }
}

/// Write a small solid-colour PNG into `dir`.
pub fn write_photo(dir: &Path) -> PathBuf {
    let path = dir.join("photo.png");
    ImageBuffer::from_pixel(32, 24, Rgb([10u8, 20, 30]))
        .save(&path)
        .unwrap();
    path
}
