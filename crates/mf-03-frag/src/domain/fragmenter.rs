//! Splitting a message into fragments.

use super::error::FragError;
use shared_types::{FrameMut, HttpMessage};

/// Splits `msg` into `max(1, ceil(body / max_size))` fragments.
///
/// Each fragment copies the start line and headers of the original, is
/// stamped `i/N` and carries the `Content-Length` of its own body slice.
/// Slices share the original body buffer.
pub fn fragment(msg: &HttpMessage, max_size: usize) -> Result<Vec<HttpMessage>, FragError> {
    if max_size == 0 {
        return Err(FragError::InvalidSize(max_size));
    }

    let body = msg.body.clone().unwrap_or_default();
    let count = body.len().div_ceil(max_size).max(1);
    let total = u32::try_from(count).map_err(|_| FragError::InvalidSize(max_size))?;

    let fragments = (0..count)
        .map(|k| {
            let start = k * max_size;
            let end = (start + max_size).min(body.len());
            let slice = body.slice(start..end);

            let mut part = HttpMessage {
                start: msg.start.clone(),
                headers: msg.headers.clone(),
                body: None,
            };
            FrameMut::of(&mut part.headers).set_fragment(k as u32 + 1, total);
            part.with_body(slice)
        })
        .collect();
    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode, Uri};
    use shared_types::Frame;

    #[test]
    fn test_fragment_count_and_lengths() {
        let msg = HttpMessage::request(Method::POST, Uri::from_static("https://svc:443/x"))
            .with_body(vec![7u8; 2500]);
        let parts = fragment(&msg, 1000).unwrap();

        assert_eq!(parts.len(), 3);
        let lengths: Vec<_> = parts.iter().map(|p| p.content_length().unwrap()).collect();
        assert_eq!(lengths, vec![1000, 1000, 500]);
        for (i, part) in parts.iter().enumerate() {
            assert_eq!(Frame::of(&part.headers).fragment().unwrap(), (i as u32 + 1, 3));
            assert_eq!(part.uri(), msg.uri());
        }
    }

    #[test]
    fn test_empty_body_is_one_fragment() {
        let msg = HttpMessage::response(StatusCode::NO_CONTENT);
        let parts = fragment(&msg, 16).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].content_length(), Some(0));
        assert_eq!(Frame::of(&parts[0].headers).fragment().unwrap(), (1, 1));
    }

    #[test]
    fn test_exact_multiple() {
        let msg = HttpMessage::response(StatusCode::OK).with_body(vec![1u8; 64]);
        assert_eq!(fragment(&msg, 16).unwrap().len(), 4);
        assert_eq!(fragment(&msg, 64).unwrap().len(), 1);
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let msg = HttpMessage::response(StatusCode::OK);
        assert_eq!(fragment(&msg, 0), Err(FragError::InvalidSize(0)));
    }
}
