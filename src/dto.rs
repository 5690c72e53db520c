#[derive(serde::Serialize)]
pub struct TranscriptionDto {
    pub text: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentDto>>,
}

#[derive(serde::Serialize)]
pub struct SegmentDto {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
    pub confidence: f32,
}

#[derive(serde::Serialize)]
pub struct HealthDto {
    pub status: &'static str,
    pub service: &'static str,
    pub model: String,
}
