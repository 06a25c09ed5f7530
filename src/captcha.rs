/// CAPTCHA challenge allocation and verification.
///
/// Only the challenge contract lives here: a challenge id is allocated with
/// a short-lived answer in the counter store, and verification is a
/// compare-and-delete. Rendering the image for a challenge id belongs to the
/// client-facing asset pipeline.
use crate::cache::{keys, CounterStore};
use crate::error::AtlasResult;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const CHALLENGE_TTL: Duration = Duration::from_secs(60);
const ANSWER_DIGITS: usize = 4;

/// Step-up challenge descriptor returned with rate-limit rejections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub captcha_id: String,
    pub captcha_type: String,
}

pub struct CaptchaService {
    store: Arc<dyn CounterStore>,
}

impl CaptchaService {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Allocate a challenge of the given type tag.
    pub async fn issue(&self, captcha_type: &str) -> AtlasResult<Challenge> {
        let captcha_id = uuid::Uuid::new_v4().simple().to_string();
        let answer: String = {
            let mut rng = rand::thread_rng();
            (0..ANSWER_DIGITS)
                .map(|_| char::from(b'0' + rng.gen_range(0..10)))
                .collect()
        };
        self.store
            .set(
                &format!("{}{}", keys::CAPTCHA, captcha_id),
                &answer,
                Some(CHALLENGE_TTL),
            )
            .await?;
        Ok(Challenge {
            captcha_id,
            captcha_type: captcha_type.to_string(),
        })
    }

    /// Current answer for a challenge id, for the rendering layer.
    pub async fn answer(&self, captcha_id: &str) -> AtlasResult<Option<String>> {
        self.store.get(&format!("{}{}", keys::CAPTCHA, captcha_id)).await
    }

    /// Verify a submitted answer. A challenge is single-use: it is removed
    /// whether or not the answer matched.
    pub async fn verify(&self, captcha_id: &str, answer: &str) -> AtlasResult<bool> {
        let key = format!("{}{}", keys::CAPTCHA, captcha_id);
        let expected = self.store.get(&key).await?;
        self.store.delete(&key).await?;
        Ok(expected.as_deref() == Some(answer) && !answer.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;

    fn service() -> CaptchaService {
        CaptchaService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn issue_then_verify() {
        let svc = service();
        let challenge = svc.issue("ip").await.unwrap();
        assert_eq!(challenge.captcha_type, "ip");
        let answer = svc.answer(&challenge.captcha_id).await.unwrap().unwrap();
        assert_eq!(answer.len(), 4);
        assert!(svc.verify(&challenge.captcha_id, &answer).await.unwrap());
    }

    #[tokio::test]
    async fn challenges_are_single_use() {
        let svc = service();
        let challenge = svc.issue("ip").await.unwrap();
        let answer = svc.answer(&challenge.captcha_id).await.unwrap().unwrap();
        assert!(svc.verify(&challenge.captcha_id, &answer).await.unwrap());
        assert!(!svc.verify(&challenge.captcha_id, &answer).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_answer_fails_and_burns_the_challenge() {
        let svc = service();
        let challenge = svc.issue("ip").await.unwrap();
        assert!(!svc.verify(&challenge.captcha_id, "nope").await.unwrap());
        let answer = svc.answer(&challenge.captcha_id).await.unwrap();
        assert_eq!(answer, None);
    }

    #[tokio::test]
    async fn unknown_challenge_fails() {
        assert!(!service().verify("missing", "1234").await.unwrap());
    }
}
