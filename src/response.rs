use crate::fixture::{FixtureBody, FixtureEntry};
use crate::{Error, ErrorKind};
use http::StatusCode;
use serde::Serialize;
use serde_json::ser::Formatter;
use std::fs;
use std::io;

/// The `Content-Type` inserted for structured bodies that don't declare one.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

///
/// A mocked response materialized from a fixture.
///
/// Dynamic hooks receive a mutable reference to it before it is handed over to the client,
/// so every field is public.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    /// The URL that was requested.
    pub url: String,
    /// The status code.
    pub code: StatusCode,
    /// The uppercase request method.
    pub method: String,
    /// The raw body.
    pub body: Vec<u8>,
    /// The headers, with canonical names (`Content-Type`, `X-Request-Id`).
    pub headers: Vec<(String, String)>,
}

impl Response {
    ///
    /// Materializes `entry` into a response for `url`.
    ///
    /// File bodies are read from disk on every call, relative to the directory of the fixture
    /// file. Structured bodies are serialized as JSON and get a `Content-Type` header unless the
    /// fixture declares one, whatever its letter case.
    ///
    pub fn build(entry: &FixtureEntry, url: &str) -> Result<Response, Error> {
        let mut headers = entry.headers.clone();

        let body = match entry.body {
            FixtureBody::Text(ref text) => text.clone().into_bytes(),
            FixtureBody::File(ref file) => {
                let path = entry.cwd.join(file);
                fs::read(&path).map_err(|err| {
                    Error::new_with_context(
                        ErrorKind::ResponseBuild,
                        format!("{}: {}", path.display(), err),
                    )
                })?
            }
            FixtureBody::Structured(ref value) => {
                let body = to_json_vec(value)
                    .map_err(|err| Error::new_with_context(ErrorKind::ResponseBuild, err))?;

                if !headers
                    .iter()
                    .any(|(field, _)| field.eq_ignore_ascii_case("content-type"))
                {
                    headers.push(("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()));
                }

                body
            }
        };

        Ok(Response {
            url: url.to_string(),
            code: entry.code,
            method: entry.method.clone(),
            body,
            headers: canonicalize_headers(headers),
        })
    }

    ///
    /// Returns the value of the header `field`, ignoring the letter case of the name.
    ///
    pub fn header(&self, field: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, value)| value.as_str())
    }

    ///
    /// Shallow-merges the JSON object `data` into the body, which must itself be a JSON object.
    /// Keys from `data` win.
    ///
    /// ## Example
    ///
    /// ```
    /// use flymock::Response;
    /// use serde_json::json;
    ///
    /// let mut response = Response {
    ///     url: "http://example.com/json".into(),
    ///     code: http::StatusCode::OK,
    ///     method: "GET".into(),
    ///     body: br#"{"code": 2, "name": "demo"}"#.to_vec(),
    ///     headers: vec![],
    /// };
    ///
    /// response.patch_json(&json!({"code": 3})).unwrap();
    /// assert_eq!(br#"{"code": 3, "name": "demo"}"#.to_vec(), response.body);
    /// ```
    ///
    pub fn patch_json(&mut self, data: &serde_json::Value) -> Result<(), Error> {
        let patch = data.as_object().ok_or_else(|| {
            Error::new_with_context(ErrorKind::NotJson, "the patch is not a JSON object")
        })?;

        let mut current: serde_json::Value = serde_json::from_slice(&self.body)
            .map_err(|err| Error::new_with_context(ErrorKind::NotJson, err))?;

        let object = match current {
            serde_json::Value::Object(ref mut object) => object,
            ref other => {
                return Err(Error::new_with_context(
                    ErrorKind::NotJson,
                    format!("{} is not an object", other),
                ))
            }
        };

        for (key, value) in patch {
            object.insert(key.clone(), value.clone());
        }

        self.body = to_json_vec(&current)
            .map_err(|err| Error::new_with_context(ErrorKind::ResponseBuild, err))?;

        Ok(())
    }
}

///
/// Title-cases every dash-separated segment of a header name: `x-custom-id` becomes
/// `X-Custom-Id`.
///
pub fn canonical_header_name(field: &str) -> String {
    field
        .split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

// Later declarations override earlier ones that canonicalize to the same name.
fn canonicalize_headers(headers: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut canonical: Vec<(String, String)> = Vec::with_capacity(headers.len());

    for (field, value) in headers {
        let field = canonical_header_name(&field);
        match canonical.iter_mut().find(|(name, _)| *name == field) {
            Some(existing) => existing.1 = value,
            None => canonical.push((field, value)),
        }
    }

    canonical
}

///
/// Writes JSON with `", "` and `": "` separators, e.g. `{"code": 2}`.
///
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

pub(crate) fn to_json_vec<T>(value: &T) -> Result<Vec<u8>, serde_json::Error>
where
    T: ?Sized + Serialize,
{
    let mut body = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut body, SpacedFormatter);
    value.serialize(&mut serializer)?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::parse_fixtures;
    use serde_json::json;
    use std::path::Path;

    fn entry(source: &str, cwd: &Path) -> FixtureEntry {
        parse_fixtures(source, cwd).unwrap().remove(0)
    }

    fn is_canonical(field: &str) -> bool {
        field.split('-').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
    }

    #[test]
    fn test_canonical_header_name() {
        assert_eq!("Content-Type", canonical_header_name("content-type"));
        assert_eq!("X-Custom-Id", canonical_header_name("x-custom-id"));
        assert_eq!("Etag", canonical_header_name("ETAG"));
        assert_eq!("X-Request-Id", canonical_header_name("X-REQUEST-ID"));
    }

    #[test]
    fn test_text_body() {
        let entry = entry(
            "- path: /text\n  code: 201\n  body: hello\n  headers: {x-custom-id: abc, CONTENT-TYPE: text/plain}\n",
            Path::new("/fixtures"),
        );
        let response = Response::build(&entry, "http://example.com/text").unwrap();

        assert_eq!("http://example.com/text", response.url);
        assert_eq!(StatusCode::CREATED, response.code);
        assert_eq!("GET", response.method);
        assert_eq!(b"hello".to_vec(), response.body);
        assert_eq!(
            vec![
                ("X-Custom-Id".to_string(), "abc".to_string()),
                ("Content-Type".to_string(), "text/plain".to_string()),
            ],
            response.headers
        );
        assert!(response.headers.iter().all(|(field, _)| is_canonical(field)));
    }

    #[test]
    fn test_structured_body_adds_content_type() {
        let entry = entry("- path: /json\n  body: {code: 2}\n", Path::new("/fixtures"));
        let response = Response::build(&entry, "http://example.com/json").unwrap();

        assert_eq!(br#"{"code": 2}"#.to_vec(), response.body);
        assert_eq!(
            vec![("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string())],
            response.headers
        );
    }

    #[test]
    fn test_structured_body_keeps_declared_content_type_in_any_case() {
        let entry = entry(
            "- path: /json\n  body: [1, {a: b}]\n  headers: {content-type: application/vnd.api+json}\n",
            Path::new("/fixtures"),
        );
        let response = Response::build(&entry, "http://example.com/json").unwrap();

        assert_eq!(br#"[1, {"a": "b"}]"#.to_vec(), response.body);
        assert_eq!(
            vec![(
                "Content-Type".to_string(),
                "application/vnd.api+json".to_string()
            )],
            response.headers
        );
    }

    #[test]
    fn test_structured_body_preserves_key_order() {
        let entry = entry("- path: /json\n  body: {z: 1, a: 2, m: 3}\n", Path::new("/fixtures"));
        let response = Response::build(&entry, "http://example.com/json").unwrap();

        assert_eq!(br#"{"z": 1, "a": 2, "m": 3}"#.to_vec(), response.body);
    }

    #[test]
    fn test_unencodable_structured_body() {
        let entry = entry("- path: /json\n  body: {~: 1}\n", Path::new("/fixtures"));
        let err = Response::build(&entry, "http://example.com/json").unwrap_err();

        assert_eq!(ErrorKind::ResponseBuild, err.kind);
    }

    #[test]
    fn test_file_body_is_read_relative_to_fixture_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("payload.bin"), [0u8, 159, 146, 150]).unwrap();
        let entry = entry(
            "- path: /file\n  body: payload.bin\n  body_type: file\n",
            dir.path(),
        );

        let first = Response::build(&entry, "http://example.com/file").unwrap();
        let second = Response::build(&entry, "http://example.com/file").unwrap();

        assert_eq!(vec![0u8, 159, 146, 150], first.body);
        assert_eq!(first.body, second.body);
        assert_eq!(&FixtureBody::File("payload.bin".into()), entry.body());
    }

    #[test]
    fn test_missing_file_body() {
        let dir = tempfile::tempdir().unwrap();
        let entry = entry("- path: /file\n  body: nope.json\n  body_type: file\n", dir.path());
        let err = Response::build(&entry, "http://example.com/file").unwrap_err();

        assert_eq!(ErrorKind::ResponseBuild, err.kind);
        assert!(err.to_string().contains("nope.json"));
    }

    #[test]
    fn test_duplicate_canonical_headers_keep_last_value() {
        let headers = canonicalize_headers(vec![
            ("x-id".into(), "1".into()),
            ("X-ID".into(), "2".into()),
        ]);

        assert_eq!(vec![("X-Id".to_string(), "2".to_string())], headers);
    }

    #[test]
    fn test_patch_json_merges() {
        let entry = entry("- path: /json\n  body: {code: 2, name: demo}\n", Path::new("/fixtures"));
        let mut response = Response::build(&entry, "http://example.com/json").unwrap();

        response.patch_json(&json!({"code": 3, "extra": true})).unwrap();

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(json!({"code": 3, "name": "demo", "extra": true}), body);
        assert_eq!(
            br#"{"code": 3, "name": "demo", "extra": true}"#.to_vec(),
            response.body
        );
    }

    #[test]
    fn test_patch_json_on_text_body() {
        let entry = entry("- path: /text\n  body: hello\n", Path::new("/fixtures"));
        let mut response = Response::build(&entry, "http://example.com/text").unwrap();

        let err = response.patch_json(&json!({"code": 3})).unwrap_err();
        assert_eq!(ErrorKind::NotJson, err.kind);
        assert_eq!(b"hello".to_vec(), response.body);
    }

    #[test]
    fn test_patch_json_on_json_array() {
        let entry = entry("- path: /list\n  body: [1, 2]\n", Path::new("/fixtures"));
        let mut response = Response::build(&entry, "http://example.com/list").unwrap();

        let err = response.patch_json(&json!({"code": 3})).unwrap_err();
        assert_eq!(ErrorKind::NotJson, err.kind);
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let entry = entry("- path: /json\n  body: {code: 2}\n", Path::new("/fixtures"));
        let response = Response::build(&entry, "http://example.com/json").unwrap();

        assert_eq!(Some(JSON_CONTENT_TYPE), response.header("content-type"));
        assert_eq!(None, response.header("x-missing"));
    }
}
