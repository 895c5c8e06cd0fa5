//! PostgREST client for the `rooms` and `messages` tables

use async_trait::async_trait;
use serde_json::json;

use super::{check, Service, SupabaseClient};
use crate::remote::DataApi;
use crate::shared::{Message, NewMessage, NewRoom, Result, Room, RoomId, TalkError};

#[async_trait]
impl DataApi for SupabaseClient {
    async fn list_rooms(&self) -> Result<Vec<Room>> {
        let request = self
            .client
            .get(self.config.rest_url("rooms"))
            .query(&[("select", "*"), ("order", "created_at.asc")]);
        let response = self.authorized(request).await.send().await?;
        let response = check(response, Service::Data).await?;

        let rooms: Vec<Room> = response.json().await?;
        tracing::debug!("Fetched {} rooms", rooms.len());
        Ok(rooms)
    }

    async fn insert_room(&self, name: &str) -> Result<Room> {
        let request = self
            .client
            .post(self.config.rest_url("rooms"))
            .header("Prefer", "return=representation")
            .json(&json!([NewRoom {
                name: name.to_string()
            }]));
        let response = self.authorized(request).await.send().await?;
        let response = check(response, Service::Data).await?;
        let status = response.status().as_u16();

        let rows: Vec<Room> = response.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| TalkError::remote(status, "Insert returned no row"))
    }

    async fn list_messages(&self, room_id: RoomId) -> Result<Vec<Message>> {
        let room_filter = format!("eq.{}", room_id);
        let request = self.client.get(self.config.rest_url("messages")).query(&[
            ("select", "*"),
            ("room_id", room_filter.as_str()),
            ("order", "created_at.asc,id.asc"),
        ]);
        let response = self.authorized(request).await.send().await?;
        let response = check(response, Service::Data).await?;

        let messages: Vec<Message> = response.json().await?;
        tracing::debug!("Fetched {} messages for room {}", messages.len(), room_id);
        Ok(messages)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<()> {
        let request = self
            .client
            .post(self.config.rest_url("messages"))
            .header("Prefer", "return=minimal")
            .json(&json!([message]));
        let response = self.authorized(request).await.send().await?;
        check(response, Service::Data).await?;
        Ok(())
    }
}
