use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE,
    ORIGIN, REFERER, USER_AGENT,
};

use crate::utils::error::FetchError;

/// Build browser-like headers for loading the session page
///
/// The session page is an ordinary HTML document, so the request looks like a
/// top-level navigation.
///
/// # Examples
///
/// ```
/// use roomwatch::crawler::headers::build_page_headers;
///
/// let headers = build_page_headers(
///     "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
///     "https://rooms.example.edu/BrowseEvents.aspx",
/// ).unwrap();
/// assert!(headers.contains_key("sec-fetch-mode"));
/// ```
pub fn build_page_headers(user_agent: &str, referer: &str) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, header_value(user_agent)?);
    headers.insert(REFERER, header_value(referer)?);
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );

    // Sec-Fetch headers for a top-level navigation
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("upgrade-insecure-requests"),
        HeaderValue::from_static("1"),
    );

    Ok(headers)
}

/// Build headers for the bulk bookings query (XHR from the browse page)
///
/// # Arguments
///
/// * `user_agent` - Browser user agent
/// * `origin` - Scheme and host of the reservation site
/// * `referer` - Page the query is issued from
/// * `token_header` - Name of the header carrying the anti-forgery token
/// * `token` - Current anti-forgery token
pub fn build_api_headers(
    user_agent: &str,
    origin: &str,
    referer: &str,
    token_header: &str,
    token: &str,
) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, header_value(user_agent)?);
    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
    );
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=UTF-8"),
    );
    headers.insert(ORIGIN, header_value(origin)?);
    headers.insert(REFERER, header_value(referer)?);
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );

    // Sec-Fetch headers for AJAX requests
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("empty"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("cors"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("same-origin"),
    );

    let name = HeaderName::from_bytes(token_header.as_bytes())
        .map_err(|_| FetchError::InvalidHeader(token_header.to_string()))?;
    headers.insert(name, header_value(token)?);

    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue, FetchError> {
    HeaderValue::from_str(value).map_err(|_| FetchError::InvalidHeader(value.to_string()))
}
