use serde::Deserialize;

/// Provision request body. Fields default to empty so that missing values
/// surface as `VALIDATION_ERROR` details instead of a deserializer reject.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub camera_id: String,
    #[serde(default)]
    pub rtsp_url: String,
    pub transport: Option<String>,
    pub codec_hint: Option<String>,
    pub target_profiles: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeprovisionRequest {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub camera_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsQuery {
    pub tenant_id: Option<String>,
    pub camera_id: Option<String>,
    pub status: Option<String>,
    pub sid: Option<String>,
}
