use serde::Deserialize;

use crate::controller::Controller;
use crate::settings::Settings;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub controller: Controller,
    pub settings: Settings,
}
