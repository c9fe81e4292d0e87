use async_trait::async_trait;
use teloxide::{net::Download, prelude::*};

use crate::ai::ChatClient;
use crate::bots::WBot;
use crate::error::{BotError, BotResult};

const PROMPT: &str = "На скриншоте отзыв о товаре на маркетплейсе. \
Сколько звёзд поставил автор отзыва? Ответь одной цифрой от 1 до 5. \
Если на изображении нет отзыва или оценку не видно, ответь словом unknown.";

/// What a review screenshot tells about the rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Five,
    Rejected(u8),
    Undetermined,
}

#[async_trait]
pub trait ScreenshotVerifier: Send + Sync {
    async fn verify(&self, image: &[u8]) -> Verdict;
}

/// Asks the vision model for the number of stars.
pub struct VisionVerifier(pub ChatClient);

#[async_trait]
impl ScreenshotVerifier for VisionVerifier {
    async fn verify(&self, image: &[u8]) -> Verdict {
        match self.0.describe_image(PROMPT, image).await {
            Ok(answer) => {
                log::debug!("vision answer: {}", answer);
                parse_stars(&answer)
            }
            Err(e) => {
                log::warn!("screenshot check failed: {}", e);
                Verdict::Undetermined
            }
        }
    }
}

/// Leaves every screenshot to the admins.
pub struct ManualVerifier;

#[async_trait]
impl ScreenshotVerifier for ManualVerifier {
    async fn verify(&self, _image: &[u8]) -> Verdict {
        Verdict::Undetermined
    }
}

pub fn parse_stars(answer: &str) -> Verdict {
    let mut digits = answer.chars().filter_map(|c| c.to_digit(10)).filter(|d| (1..=5).contains(d));
    match (digits.next(), digits.next()) {
        (Some(5), None) => Verdict::Five,
        (Some(stars), None) => Verdict::Rejected(stars as u8),
        _ => Verdict::Undetermined,
    }
}

pub async fn download_photo(bot: &WBot, file_id: &str) -> BotResult<Vec<u8>> {
    let file = bot.get_file(file_id).await?;
    let mut buf = Vec::with_capacity(file.size as usize);
    bot.inner()
        .download_file(&file.path, &mut buf)
        .await
        .map_err(|e| BotError::Upstream(format!("photo download: {}", e)))?;
    Ok(buf)
}
