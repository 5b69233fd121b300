#[cfg(feature = "provider-gemini")]
pub mod gemini;

#[cfg(feature = "provider-openai")]
pub mod openai;

#[cfg(feature = "http-transport")]
pub(crate) fn map_reqwest_error(error: reqwest::Error) -> crate::ProviderError {
    if error.is_timeout() {
        crate::ProviderError::timeout(error.to_string())
    } else if error.is_decode() {
        crate::ProviderError::protocol(error.to_string())
    } else {
        crate::ProviderError::transport(error.to_string())
    }
}
