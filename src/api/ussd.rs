use axum::{extract::State, Form};
use serde::Deserialize;
use tracing::{error, info};
use utoipa::ToSchema;

use super::AppState;
use crate::db::{models::Reading, HistoryQuery, Store, StoreError};

const HISTORY_ENTRIES: i64 = 5;

const MAIN_MENU: &str =
    "CON Constantinople Enterprise\nWater Monitoring System\n\n1. Latest Readings\n2. History";
const SYSTEM_ERROR: &str = "END System error. Try again later.";

/// Form body posted by the USSD gateway.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UssdRequest {
    pub session_id: String,
    pub service_code: String,
    pub phone_number: String,
    /// Menu path entered so far; empty on the first request of a session.
    pub text: String,
}

/// Text menu for feature phones. `CON` keeps the session open, `END` closes it.
#[utoipa::path(
    post,
    path = "/ussd",
    request_body(content = UssdRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Menu text", body = String, content_type = "text/plain"),
    ),
    tag = "ussd"
)]
pub async fn handle_ussd(State(state): State<AppState>, Form(req): Form<UssdRequest>) -> String {
    info!(
        session_id = %req.session_id,
        service_code = %req.service_code,
        phone_number = %req.phone_number,
        text = %req.text,
        "USSD request"
    );

    match respond(state.store.as_ref(), req.text.trim()).await {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "USSD handler failed");
            SYSTEM_ERROR.to_owned()
        }
    }
}

async fn respond(store: &dyn Store, text: &str) -> Result<String, StoreError> {
    let body = match text {
        "" => MAIN_MENU.to_owned(),
        "1" => match store.latest_reading().await? {
            Some(r) => latest_text(&r),
            None => "END No data available yet.".to_owned(),
        },
        "2" => {
            let query = HistoryQuery {
                limit: HISTORY_ENTRIES,
                ..Default::default()
            };
            history_text(&store.history(&query).await?)
        }
        _ => "END Invalid option.".to_owned(),
    };
    Ok(body)
}

fn latest_text(r: &Reading) -> String {
    format!(
        "END Latest Readings\n\npH: {}\nTurbidity: {} NTU\nTemperature: {}°C\nUpdated: {}",
        r.ph,
        r.turbidity,
        r.temperature,
        r.recorded_at.format("%Y-%m-%d %H:%M UTC"),
    )
}

fn history_text(rows: &[Reading]) -> String {
    if rows.is_empty() {
        return "END No history records.".to_owned();
    }

    let mut out = String::from("END Recent Records:\n\n");
    for (i, r) in rows.iter().enumerate() {
        out.push_str(&format!(
            "{}. pH:{} NTU:{} T:{}°C\n",
            i + 1,
            r.ph,
            r.turbidity,
            r.temperature
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum_test::TestServer;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::{
        api::{router, AppState},
        db::{
            models::{Device, DeviceState, DeviceTarget, NewDevice, NewReading},
            MemoryStore,
        },
    };

    fn server(store: Arc<dyn Store>) -> TestServer {
        TestServer::new(router(AppState::new(store))).unwrap()
    }

    async fn post(server: &TestServer, text: &str) -> String {
        let resp = server
            .post("/ussd")
            .form(&[
                ("sessionId", "ATUid_1"),
                ("serviceCode", "*384#"),
                ("phoneNumber", "+254700000000"),
                ("text", text),
            ])
            .await;
        resp.assert_status_ok();
        resp.text()
    }

    #[tokio::test]
    async fn empty_text_shows_main_menu() {
        let server = server(Arc::new(MemoryStore::new()));
        let menu = post(&server, "").await;
        assert_eq!(menu, MAIN_MENU);
        assert_eq!(
            menu.lines().collect::<Vec<_>>(),
            [
                "CON Constantinople Enterprise",
                "Water Monitoring System",
                "",
                "1. Latest Readings",
                "2. History",
            ]
        );
    }

    #[tokio::test]
    async fn latest_without_data() {
        let server = server(Arc::new(MemoryStore::new()));
        assert_eq!(post(&server, "1").await, "END No data available yet.");
        assert_eq!(post(&server, "2").await, "END No history records.");
    }

    #[tokio::test]
    async fn latest_reading_text() {
        let store = MemoryStore::new();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
        store
            .insert_reading(&NewReading::new(7.2, 3.5, 25.4, at))
            .await
            .unwrap();

        let server = server(Arc::new(store));
        assert_eq!(
            post(&server, "1").await,
            "END Latest Readings\n\npH: 7.2\nTurbidity: 3.5 NTU\nTemperature: 25.4°C\nUpdated: 2026-03-01 08:30 UTC"
        );
    }

    #[tokio::test]
    async fn history_lists_last_five_newest_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let phs = [7.0, 7.1, 7.2, 7.3, 7.4, 7.5, 7.6];
        for (i, ph) in (0..).zip(phs) {
            store
                .insert_reading(&NewReading::new(ph, 3.0, 25.0, now - TimeDelta::minutes(i)))
                .await
                .unwrap();
        }

        let text = post(&server(Arc::new(store)), "2").await;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "END Recent Records:");
        assert_eq!(lines[2], "1. pH:7 NTU:3 T:25°C");
        assert_eq!(lines[6], "5. pH:7.4 NTU:3 T:25°C");
        assert_eq!(lines.len(), 7);
    }

    #[tokio::test]
    async fn unknown_option() {
        let server = server(Arc::new(MemoryStore::new()));
        assert_eq!(post(&server, "3").await, "END Invalid option.");
        assert_eq!(post(&server, "1*2").await, "END Invalid option.");
    }

    struct DownStore;

    #[async_trait]
    impl Store for DownStore {
        async fn insert_reading(&self, _: &NewReading) -> Result<i64, StoreError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
        async fn latest_reading(&self) -> Result<Option<Reading>, StoreError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
        async fn history(&self, _: &HistoryQuery) -> Result<Vec<Reading>, StoreError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
        async fn update_device_state(
            &self,
            _: DeviceTarget,
            _: &DeviceState,
        ) -> Result<u64, StoreError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
        async fn list_devices(&self) -> Result<Vec<Device>, StoreError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
        async fn seed_devices(
            &self,
            _: &[NewDevice],
            _: DateTime<Utc>,
        ) -> Result<usize, StoreError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
    }

    #[tokio::test]
    async fn store_failure_answers_system_error() {
        let server = server(Arc::new(DownStore));
        assert_eq!(post(&server, "1").await, SYSTEM_ERROR);
        assert_eq!(post(&server, "2").await, SYSTEM_ERROR);
        // The main menu never touches the store.
        assert_eq!(post(&server, "").await, MAIN_MENU);
    }
}
