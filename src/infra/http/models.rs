use serde::Serialize;

use crate::domain::signature::SignatureResult;

const SUCCESS_MESSAGE: &str = "Signature processed and uploaded successfully";

#[derive(Debug, Serialize)]
pub struct SignatureResponse {
    pub success: bool,
    pub message: String,
    pub details: SignatureDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureDetails {
    pub images_uploaded: usize,
    pub cdn_paths: Vec<String>,
    pub signature_path: String,
}

impl From<SignatureResult> for SignatureResponse {
    fn from(result: SignatureResult) -> Self {
        Self {
            success: true,
            message: SUCCESS_MESSAGE.to_string(),
            details: SignatureDetails {
                images_uploaded: result.images_uploaded,
                cdn_paths: result.asset_paths,
                signature_path: result.document_path,
            },
        }
    }
}
