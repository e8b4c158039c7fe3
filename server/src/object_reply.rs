use axum::{
    body::Body,
    http::HeaderValue,
    response::{IntoResponse, Response},
};
use utoipa::{
    openapi::{
        self,
        content::ContentBuilder,
        schema::{KnownFormat, ObjectBuilder, SchemaFormat, Type},
        RefOr, ResponseBuilder,
    },
    ToResponse,
};

const UUID_LEN: usize = 36;

/// Object served from the local store.
pub struct ObjectReply {
    data: Vec<u8>,
    content_type: String,
    key: String,
}

impl ObjectReply {
    #[must_use]
    pub fn new(data: Vec<u8>, content_type: String, key: String) -> Self {
        Self {
            data,
            content_type,
            key,
        }
    }

    /// Original file name: the key without its `{uuid}-` prefix.
    fn name_from_key(&self) -> &str {
        let key = &self.key;
        match (key.get(..UUID_LEN), key.get(UUID_LEN..=UUID_LEN), key.get(UUID_LEN + 1..)) {
            (Some(prefix), Some("-"), Some(name))
                if !name.is_empty() && uuid::Uuid::try_parse(prefix).is_ok() =>
            {
                name
            }
            _ => key,
        }
    }
}

impl IntoResponse for ObjectReply {
    fn into_response(self) -> Response {
        let disposition = content_disposition(self.name_from_key());
        let len = self.data.len().to_string();
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

        let mut res = Body::from(self.data).into_response();
        res.headers_mut().insert("content-type", content_type);
        if let Ok(val) = HeaderValue::from_str(disposition.as_str()) {
            res.headers_mut().insert("content-disposition", val);
        }
        if let Ok(val) = HeaderValue::from_str(len.as_str()) {
            res.headers_mut().insert("Content-Length", val);
        }

        res
    }
}

/// Attachment header with a plain ASCII `filename` for old clients and the
/// exact UTF-8 name in `filename*` (RFC 6266).
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        r#"attachment; filename="{fallback}"; filename*=UTF-8''{}"#,
        urlencoding::encode(name)
    )
}

impl ToResponse<'static> for ObjectReply {
    fn response() -> (&'static str, RefOr<openapi::Response>) {
        let object = ObjectBuilder::new()
            .schema_type(Type::String)
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::Binary)))
            .build();
        let content = ContentBuilder::new().schema(Some(object)).build();
        (
            "ObjectReply",
            ResponseBuilder::new()
                .description("Object bytes with the content type given at upload")
                .content("application/octet-stream", content)
                .build()
                .into(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "")]
    #[case("a.pdf", "a.pdf")]
    #[case("0b9e4bd2-5d5c-4a7e-9a39-4f0f2a4b8f11-a.pdf", "a.pdf")]
    #[case("0b9e4bd2-5d5c-4a7e-9a39-4f0f2a4b8f11-with-dashes.tar.gz", "with-dashes.tar.gz")]
    #[case("0b9e4bd2-5d5c-4a7e-9a39-4f0f2a4b8f11-", "0b9e4bd2-5d5c-4a7e-9a39-4f0f2a4b8f11-")]
    #[case("not-a-uuid-at-all-but-long-enough-x-report.pdf", "not-a-uuid-at-all-but-long-enough-x-report.pdf")]
    #[case("0b9e4bd2-5d5c-4a7e-9a39-4f0f2a4b8f11-отчёт.pdf", "отчёт.pdf")]
    #[trace]
    fn name_from_key(#[case] key: &str, #[case] expected: &str) {
        // Arrange
        let reply = ObjectReply::new(Vec::new(), "text/plain".to_owned(), key.to_owned());

        // Act
        let name = reply.name_from_key();

        // Assert
        assert_eq!(name, expected);
    }

    #[test]
    fn headers() {
        // Arrange
        let reply = ObjectReply::new(
            b"hello".to_vec(),
            "text/plain".to_owned(),
            "0b9e4bd2-5d5c-4a7e-9a39-4f0f2a4b8f11-hello.txt".to_owned(),
        );

        // Act
        let res = reply.into_response();

        // Assert
        let headers = res.headers();
        assert_eq!(headers["content-type"], "text/plain");
        assert_eq!(headers["content-length"], "5");
        assert_eq!(
            headers["content-disposition"],
            r#"attachment; filename="hello.txt"; filename*=UTF-8''hello.txt"#
        );
    }

    #[rstest]
    #[case("0b9e4bd2-5d5c-4a7e-9a39-4f0f2a4b8f11-отчёт.pdf", r#"attachment; filename="_____.pdf"; filename*=UTF-8''%D0%BE%D1%82%D1%87%D1%91%D1%82.pdf"#)]
    #[case(r#"say "hi".txt"#, r#"attachment; filename="say _hi_.txt"; filename*=UTF-8''say%20%22hi%22.txt"#)]
    #[trace]
    fn disposition_keeps_non_ascii_names(#[case] key: &str, #[case] expected: &str) {
        // Arrange
        let reply = ObjectReply::new(b"x".to_vec(), "application/pdf".to_owned(), key.to_owned());

        // Act
        let res = reply.into_response();

        // Assert
        assert_eq!(res.headers()["content-disposition"], expected);
    }
}
