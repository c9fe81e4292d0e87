use std::{marker::PhantomData, sync::Arc};

use futures_util::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::SqlitePool;
use teloxide::{dispatching::dialogue::Storage as DialogueStorage, types::ChatId};

use crate::impls::now;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("session decoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Dialogue storage keeping one JSON record per chat. Records older than the ttl read as absent.
pub struct SessionStorage<D> {
    pool: SqlitePool,
    ttl: i64,
    _state: PhantomData<fn() -> D>,
}

impl<D> SessionStorage<D>
where
    D: Serialize + DeserializeOwned,
{
    pub fn new(pool: SqlitePool, ttl: i64) -> Arc<Self> {
        Arc::new(Self { pool, ttl, _state: PhantomData })
    }

    pub async fn get_at(&self, chat_id: ChatId, now: i64) -> Result<Option<D>, SessionError> {
        let row: Option<(String, i64)> = sqlx::query_as("select state, updated_at from sessions where chat_id = ?1")
            .bind(chat_id.0)
            .fetch_optional(&self.pool).await?;
        match row {
            Some((_, updated_at)) if now - updated_at > self.ttl => {
                log::debug!("session of chat {} expired", chat_id.0);
                self.remove(chat_id).await?;
                Ok(None)
            }
            Some((state, _)) => {
                let state = serde_json::from_str(&state)?;
                self.touch(chat_id, now).await?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Reading a session keeps it alive.
    async fn touch(&self, chat_id: ChatId, now: i64) -> Result<(), SessionError> {
        sqlx::query("update sessions set updated_at = ?2 where chat_id = ?1 and updated_at < ?2")
            .bind(chat_id.0).bind(now)
            .execute(&self.pool).await?;
        Ok(())
    }

    pub async fn set_at(&self, chat_id: ChatId, state: &D, now: i64) -> Result<(), SessionError> {
        let state = serde_json::to_string(state)?;
        self.write(chat_id, state, now).await
    }

    async fn write(&self, chat_id: ChatId, state: String, now: i64) -> Result<(), SessionError> {
        sqlx::query("insert into sessions (chat_id, state, updated_at) values (?1, ?2, ?3)
            on conflict(chat_id) do update set state = excluded.state, updated_at = excluded.updated_at")
            .bind(chat_id.0).bind(state).bind(now)
            .execute(&self.pool).await?;
        Ok(())
    }

    /// Missing sessions are not an error: finishing a flow twice is harmless.
    pub async fn remove(&self, chat_id: ChatId) -> Result<(), SessionError> {
        sqlx::query("delete from sessions where chat_id = ?1")
            .bind(chat_id.0)
            .execute(&self.pool).await?;
        Ok(())
    }

    pub async fn purge_expired(&self, now: i64) -> Result<u64, SessionError> {
        let res = sqlx::query("delete from sessions where updated_at < ?1")
            .bind(now - self.ttl)
            .execute(&self.pool).await?;
        Ok(res.rows_affected())
    }
}

impl<D> DialogueStorage<D> for SessionStorage<D>
where
    D: Serialize + DeserializeOwned + Send + 'static,
{
    type Error = SessionError;

    fn remove_dialogue(self: Arc<Self>, chat_id: ChatId) -> BoxFuture<'static, Result<(), Self::Error>>
    where
        D: Send + 'static,
    {
        Box::pin(async move { self.remove(chat_id).await })
    }

    fn update_dialogue(self: Arc<Self>, chat_id: ChatId, dialogue: D) -> BoxFuture<'static, Result<(), Self::Error>>
    where
        D: Send + 'static,
    {
        Box::pin(async move {
            let state = serde_json::to_string(&dialogue)?;
            self.write(chat_id, state, now()).await
        })
    }

    fn get_dialogue(self: Arc<Self>, chat_id: ChatId) -> BoxFuture<'static, Result<Option<D>, Self::Error>> {
        Box::pin(async move { self.get_at(chat_id, now()).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistent::Storage;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Flow {
        Phone { product: i64 },
        Description { product: i64, phone: String },
    }

    async fn sessions(ttl: i64) -> Arc<SessionStorage<Flow>> {
        let db = Storage::memory().await.unwrap();
        SessionStorage::new(db.pool(), ttl)
    }

    #[tokio::test]
    async fn starting_a_flow_replaces_the_previous_one() {
        let store = sessions(100).await;
        let chat = ChatId(42);
        store.set_at(chat, &Flow::Phone { product: 1 }, 0).await.unwrap();
        let next = Flow::Description { product: 1, phone: "+79990001122".into() };
        store.set_at(chat, &next, 1).await.unwrap();
        assert_eq!(store.get_at(chat, 2).await.unwrap(), Some(next));
        let rows: i64 = sqlx::query_scalar("select count(*) from sessions").fetch_one(&store.pool).await.unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn expired_sessions_read_as_absent() {
        let store = sessions(100).await;
        let chat = ChatId(42);
        store.set_at(chat, &Flow::Phone { product: 1 }, 0).await.unwrap();
        assert!(store.get_at(chat, 100).await.unwrap().is_some());
        assert!(store.get_at(chat, 201).await.unwrap().is_none());
        assert!(store.get_at(chat, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reading_a_session_keeps_it_alive() {
        let store = sessions(100).await;
        let chat = ChatId(7);
        store.set_at(chat, &Flow::Phone { product: 1 }, 0).await.unwrap();
        assert!(store.get_at(chat, 90).await.unwrap().is_some());
        assert!(store.get_at(chat, 150).await.unwrap().is_some());
        assert_eq!(store.purge_expired(200).await.unwrap(), 0);
        assert!(store.get_at(chat, 251).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_and_remove() {
        let store = sessions(10).await;
        store.set_at(ChatId(1), &Flow::Phone { product: 1 }, 0).await.unwrap();
        store.set_at(ChatId(2), &Flow::Phone { product: 2 }, 50).await.unwrap();
        assert_eq!(store.purge_expired(55).await.unwrap(), 1);
        store.clone().remove_dialogue(ChatId(2)).await.unwrap();
        store.clone().remove_dialogue(ChatId(2)).await.unwrap();
        assert!(store.get_dialogue(ChatId(2)).await.unwrap().is_none());
    }
}
