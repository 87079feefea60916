//! Usage: LUIS publishing command.

use crate::app_state::AppState;
use crate::domain::luis::{publish_luis_to_prediction, LuisPublishRequest};
use std::collections::BTreeMap;

pub(crate) async fn luis_publish(
    state: &AppState,
    request: LuisPublishRequest,
) -> Result<BTreeMap<String, String>, String> {
    publish_luis_to_prediction(&state.http, &request)
        .await
        .map_err(Into::into)
}
