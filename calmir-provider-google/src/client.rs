//! REST client for the Calendar v3 API.

use async_trait::async_trait;
use calmir_core::error::{CalmirError, CalmirResult};
use calmir_core::remote::protocol::{
    BusyInterval, CalendarApi, CalendarListPage, ColorDefinition, Colors, EventPayload,
    EventQuery, EventsPage, FreeBusyRequest, FreeBusyResponse, RemoteCalendar, RemoteEvent,
    RemoteSetting, WatchChannel, WatchRequest,
};
use calmir_core::remote::AccessToken;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::convert::{
    calendar_from_google, event_from_google, payload_to_google, GoogleCalendarList,
    GoogleChannel, GoogleChannelRequest, GoogleColors, GoogleErrorBody, GoogleEvent,
    GoogleEvents, GoogleFreeBusyItem, GoogleFreeBusyRequest, GoogleFreeBusyResponse,
    GoogleSetting, GoogleSettings,
};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3/";

pub struct GoogleCalendarApi {
    http: reqwest::Client,
    base_url: Url,
}

impl Default for GoogleCalendarApi {
    fn default() -> Self {
        GoogleCalendarApi::new()
    }
}

impl GoogleCalendarApi {
    pub fn new() -> GoogleCalendarApi {
        GoogleCalendarApi {
            http: reqwest::Client::new(),
            // The constant is a valid URL.
            base_url: Url::parse(DEFAULT_BASE_URL).unwrap(),
        }
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_base_url(base_url: Url) -> GoogleCalendarApi {
        GoogleCalendarApi {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> CalmirResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CalmirError::Config("provider base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> CalmirResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::classify(status, response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CalmirError::Serialization(e.to_string()))
    }

    async fn read_empty(response: Response) -> CalmirResult<()> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::classify(status, response).await);
        }
        Ok(())
    }

    /// Turn a non-success response into the error taxonomy, pulling
    /// the message out of Google's error envelope when present.
    async fn classify(status: StatusCode, response: Response) -> CalmirError {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GoogleErrorBody>(&body)
            .ok()
            .map(|b| b.error.message)
            .filter(|m| !m.is_empty())
            .unwrap_or(body);
        CalmirError::from_status(status.as_u16(), &message)
    }

    fn transport(error: reqwest::Error) -> CalmirError {
        if error.is_timeout() {
            CalmirError::Timeout(error.to_string())
        } else {
            CalmirError::Network(error.to_string())
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &AccessToken,
        url: Url,
    ) -> CalmirResult<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(Self::transport)?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarApi {
    async fn list_calendars(
        &self,
        token: &AccessToken,
        page_token: Option<&str>,
    ) -> CalmirResult<CalendarListPage> {
        let mut url = self.endpoint(&["users", "me", "calendarList"])?;
        if let Some(page_token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", page_token);
        }

        let list: GoogleCalendarList = self.get_json(token, url).await?;
        let items = list
            .items
            .into_iter()
            .map(calendar_from_google)
            .collect::<CalmirResult<Vec<RemoteCalendar>>>()?;

        Ok(CalendarListPage {
            items,
            next_page_token: list.next_page_token,
        })
    }

    async fn get_calendar(
        &self,
        token: &AccessToken,
        calendar_id: &str,
    ) -> CalmirResult<RemoteCalendar> {
        let url = self.endpoint(&["users", "me", "calendarList", calendar_id])?;
        let entry = self.get_json(token, url).await?;
        calendar_from_google(entry)
    }

    async fn list_events(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        query: &EventQuery,
    ) -> CalmirResult<EventsPage> {
        let mut url = self.endpoint(&["calendars", calendar_id, "events"])?;
        {
            let mut pairs = url.query_pairs_mut();
            if query.max_results > 0 {
                pairs.append_pair("maxResults", &query.max_results.to_string());
            }
            if query.show_deleted {
                pairs.append_pair("showDeleted", "true");
            }
            if query.single_events {
                pairs.append_pair("singleEvents", "true");
            }
            if let Some(page_token) = &query.page_token {
                pairs.append_pair("pageToken", page_token);
            }
            if let Some(sync_token) = &query.sync_token {
                // A delta fetch; the server rejects window bounds
                // alongside a sync token.
                pairs.append_pair("syncToken", sync_token);
            } else if let Some(window) = &query.window {
                pairs.append_pair("timeMin", &window.from_rfc3339());
                pairs.append_pair("timeMax", &window.to_rfc3339());
            }
        }

        let events: GoogleEvents = self.get_json(token, url).await?;
        let items = events
            .items
            .into_iter()
            .map(event_from_google)
            .collect::<CalmirResult<Vec<RemoteEvent>>>()?;

        Ok(EventsPage {
            items,
            next_page_token: events.next_page_token,
            next_sync_token: events.next_sync_token,
        })
    }

    async fn get_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
    ) -> CalmirResult<RemoteEvent> {
        let url = self.endpoint(&["calendars", calendar_id, "events", event_id])?;
        let event: GoogleEvent = self.get_json(token, url).await?;
        event_from_google(event)
    }

    async fn insert_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> CalmirResult<RemoteEvent> {
        let url = self.endpoint(&["calendars", calendar_id, "events"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .json(&payload_to_google(payload))
            .send()
            .await
            .map_err(Self::transport)?;
        let event: GoogleEvent = Self::read_json(response).await?;
        event_from_google(event)
    }

    async fn update_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> CalmirResult<RemoteEvent> {
        let url = self.endpoint(&["calendars", calendar_id, "events", event_id])?;
        let response = self
            .http
            .put(url)
            .bearer_auth(token.secret())
            .json(&payload_to_google(payload))
            .send()
            .await
            .map_err(Self::transport)?;
        let event: GoogleEvent = Self::read_json(response).await?;
        event_from_google(event)
    }

    async fn patch_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> CalmirResult<RemoteEvent> {
        let url = self.endpoint(&["calendars", calendar_id, "events", event_id])?;
        let response = self
            .http
            .patch(url)
            .bearer_auth(token.secret())
            .json(&payload_to_google(payload))
            .send()
            .await
            .map_err(Self::transport)?;
        let event: GoogleEvent = Self::read_json(response).await?;
        event_from_google(event)
    }

    async fn delete_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
    ) -> CalmirResult<()> {
        let url = self.endpoint(&["calendars", calendar_id, "events", event_id])?;
        let response = self
            .http
            .delete(url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(Self::transport)?;
        Self::read_empty(response).await
    }

    async fn move_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
        destination_calendar_id: &str,
    ) -> CalmirResult<RemoteEvent> {
        let mut url = self.endpoint(&["calendars", calendar_id, "events", event_id, "move"])?;
        url.query_pairs_mut()
            .append_pair("destination", destination_calendar_id);

        let response = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(Self::transport)?;
        let event: GoogleEvent = Self::read_json(response).await?;
        event_from_google(event)
    }

    async fn quick_add(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        text: &str,
    ) -> CalmirResult<RemoteEvent> {
        let mut url = self.endpoint(&["calendars", calendar_id, "events", "quickAdd"])?;
        url.query_pairs_mut().append_pair("text", text);

        let response = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(Self::transport)?;
        let event: GoogleEvent = Self::read_json(response).await?;
        event_from_google(event)
    }

    async fn instances(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
        page_token: Option<&str>,
    ) -> CalmirResult<EventsPage> {
        let mut url =
            self.endpoint(&["calendars", calendar_id, "events", event_id, "instances"])?;
        if let Some(page_token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", page_token);
        }

        let events: GoogleEvents = self.get_json(token, url).await?;
        let items = events
            .items
            .into_iter()
            .map(event_from_google)
            .collect::<CalmirResult<Vec<RemoteEvent>>>()?;

        Ok(EventsPage {
            items,
            next_page_token: events.next_page_token,
            next_sync_token: events.next_sync_token,
        })
    }

    async fn watch_events(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        request: &WatchRequest,
    ) -> CalmirResult<WatchChannel> {
        let url = self.endpoint(&["calendars", calendar_id, "events", "watch"])?;
        let body = GoogleChannelRequest {
            id: request.channel_id.clone(),
            channel_type: "web_hook".to_string(),
            address: request.address.clone(),
            token: request.token.clone(),
            expiration: request.expiration.timestamp_millis(),
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .json(&body)
            .send()
            .await
            .map_err(Self::transport)?;
        let channel: GoogleChannel = Self::read_json(response).await?;

        let expires_at = channel
            .expiration
            .parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| {
                CalmirError::Serialization(format!(
                    "unparseable channel expiration '{}'",
                    channel.expiration
                ))
            })?;

        Ok(WatchChannel {
            channel_id: channel.id,
            resource_id: channel.resource_id,
            expires_at,
        })
    }

    async fn stop_channel(
        &self,
        token: &AccessToken,
        channel_id: &str,
        resource_id: &str,
    ) -> CalmirResult<()> {
        let url = self.endpoint(&["channels", "stop"])?;
        let body = crate::convert::GoogleStopRequest {
            id: channel_id.to_string(),
            resource_id: resource_id.to_string(),
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .json(&body)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::read_empty(response).await
    }

    async fn list_settings(&self, token: &AccessToken) -> CalmirResult<Vec<RemoteSetting>> {
        let url = self.endpoint(&["users", "me", "settings"])?;
        let settings: GoogleSettings = self.get_json(token, url).await?;
        Ok(settings
            .items
            .into_iter()
            .map(|s| RemoteSetting {
                id: s.id,
                value: s.value,
            })
            .collect())
    }

    async fn get_setting(
        &self,
        token: &AccessToken,
        setting_id: &str,
    ) -> CalmirResult<RemoteSetting> {
        let url = self.endpoint(&["users", "me", "settings", setting_id])?;
        let setting: GoogleSetting = self.get_json(token, url).await?;
        Ok(RemoteSetting {
            id: setting.id,
            value: setting.value,
        })
    }

    async fn free_busy(
        &self,
        token: &AccessToken,
        request: &FreeBusyRequest,
    ) -> CalmirResult<FreeBusyResponse> {
        let url = self.endpoint(&["freeBusy"])?;
        let body = GoogleFreeBusyRequest {
            time_min: request.window.from_rfc3339(),
            time_max: request.window.to_rfc3339(),
            items: request
                .calendar_ids
                .iter()
                .map(|id| GoogleFreeBusyItem { id: id.clone() })
                .collect(),
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .json(&body)
            .send()
            .await
            .map_err(Self::transport)?;
        let parsed: GoogleFreeBusyResponse = Self::read_json(response).await?;

        let mut result = FreeBusyResponse::default();
        for (calendar_id, calendar) in parsed.calendars {
            result.busy.insert(
                calendar_id,
                calendar
                    .busy
                    .into_iter()
                    .map(|b| BusyInterval {
                        start: b.start,
                        end: b.end,
                    })
                    .collect(),
            );
        }
        Ok(result)
    }

    async fn colors(&self, token: &AccessToken) -> CalmirResult<Colors> {
        let url = self.endpoint(&["colors"])?;
        let parsed: GoogleColors = self.get_json(token, url).await?;

        let convert = |map: std::collections::BTreeMap<String, crate::convert::GoogleColorDefinition>| {
            map.into_iter()
                .map(|(id, c)| {
                    (
                        id,
                        ColorDefinition {
                            background: c.background,
                            foreground: c.foreground,
                        },
                    )
                })
                .collect()
        };

        Ok(Colors {
            event: convert(parsed.event),
            calendar: convert(parsed.calendar),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_builds_and_encodes_path_segments() {
        let api = GoogleCalendarApi::new();
        let url = api
            .endpoint(&["calendars", "group#contacts", "events"])
            .unwrap();
        assert!(url.path().starts_with("/calendar/v3/calendars/"));
        assert!(url.path().ends_with("/events"));
        // Reserved characters in calendar ids must not break the path.
        assert!(url.as_str().contains("group%23contacts"));
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_default_base_url_parses() {
        let api = GoogleCalendarApi::default();
        assert!(api.base_url.as_str().ends_with("/calendar/v3/"));
    }
}
