use serde::{de::DeserializeOwned, Serialize};
use teloxide::{adaptors::Throttle, prelude::*};

use crate::error::{BotError, BotResult};

pub mod shop;

pub type WBot = Throttle<Bot>;

/// Telegram limits callback data to 64 bytes; base91 needs ~23% on top of postcard.
const CALLBACK_BUF: usize = 52;

fn make_username(user: &teloxide::types::User) -> String {
    let name = user.first_name.as_str();
    let last_name = user.last_name.as_ref().map(|s|format!(" {}", s)).unwrap_or_default();
    let nick = user.username.as_ref().map(|s|format!(" [@{}]", s)).unwrap_or_default();
    format!("{name}{last_name}{nick}")
}

pub trait CallbackMessage: Serialize + DeserializeOwned {
    fn to_data(&self) -> BotResult<String> {
        let mut buf = [0u8; CALLBACK_BUF];
        let bytes = postcard::to_slice(self, &mut buf)
            .map_err(|e| BotError::validation(format!("callback encoding: {}", e)))?;
        String::from_utf8(base91::slice_encode(bytes))
            .map_err(|e| BotError::validation(format!("callback encoding: {}", e)))
    }

    fn from_data(data: &str) -> BotResult<Self> {
        let bytes = base91::slice_decode(data.as_bytes());
        postcard::from_bytes(&bytes).map_err(|e| BotError::validation(format!("callback decoding: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    enum Action {
        Open(i64),
        Pick(u8, i64),
    }
    impl CallbackMessage for Action {}

    #[test]
    fn callback_data_fits_telegram_limit() {
        let action = Action::Pick(u8::MAX, i64::MIN);
        let data = action.to_data().unwrap();
        assert!(data.len() <= 64);
        assert_eq!(Action::from_data(&data).unwrap(), action);
        assert_eq!(Action::from_data(&Action::Open(7).to_data().unwrap()).unwrap(), Action::Open(7));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(Action::from_data(""), Err(BotError::Validation(_))));
    }
}
