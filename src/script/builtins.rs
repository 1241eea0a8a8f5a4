//! Builtin functions callable from scripts.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::extract;
use super::parser::{FileParser, ParserKind};
use super::value::{Value, ValueType};
use crate::http::cookies::{CookieJar, cookie_path};
use crate::http::{HttpSession, Method};
use crate::{RiaError, RiaResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    AddParsingRule,
    CreateParserForFile,
    Dehtml,
    ExtractString,
    ExtractStringFromFile,
    GetBinaryToFile,
    GetHeader,
    GetHtml,
    GetHtmlWithDump,
    GetHtmlToFile,
    GetHtmlToFileWithDump,
    IntToString,
    LastResponse,
    Length,
    LoadCookie,
    LoadFromFile,
    Post,
    PostToFile,
    PostToFileWithDump,
    PostWithDump,
    SaveCookie,
    SaveToFile,
    SetHeader,
    StringToInt,
    Substring,
}

pub struct Signature {
    pub name: &'static str,
    pub params: &'static [ValueType],
    pub ret: Option<ValueType>,
    /// Index of an int parameter that is written back when passed as a variable.
    pub inout: Option<usize>,
}

const S: ValueType = ValueType::Str;
const I: ValueType = ValueType::Int;

const fn sig(name: &'static str, params: &'static [ValueType], ret: Option<ValueType>) -> Signature {
    Signature { name, params, ret, inout: None }
}

impl Builtin {
    pub const ALL: [Builtin; 25] = [
        Builtin::AddParsingRule,
        Builtin::CreateParserForFile,
        Builtin::Dehtml,
        Builtin::ExtractString,
        Builtin::ExtractStringFromFile,
        Builtin::GetBinaryToFile,
        Builtin::GetHeader,
        Builtin::GetHtml,
        Builtin::GetHtmlWithDump,
        Builtin::GetHtmlToFile,
        Builtin::GetHtmlToFileWithDump,
        Builtin::IntToString,
        Builtin::LastResponse,
        Builtin::Length,
        Builtin::LoadCookie,
        Builtin::LoadFromFile,
        Builtin::Post,
        Builtin::PostToFile,
        Builtin::PostToFileWithDump,
        Builtin::PostWithDump,
        Builtin::SaveCookie,
        Builtin::SaveToFile,
        Builtin::SetHeader,
        Builtin::StringToInt,
        Builtin::Substring,
    ];

    pub fn lookup(name: &str) -> Option<Builtin> {
        Builtin::ALL.into_iter().find(|b| b.signature().name.eq_ignore_ascii_case(name))
    }

    pub fn signature(self) -> Signature {
        match self {
            Builtin::AddParsingRule => sig("add_parsing_rule", &[S, S, S, S], None),
            Builtin::CreateParserForFile => sig("create_parser_for_file", &[S, S], None),
            Builtin::Dehtml => sig("dehtml", &[S], Some(S)),
            Builtin::ExtractString => {
                Signature { inout: Some(1), ..sig("extract_string", &[S, I, S, S], Some(S)) }
            }
            Builtin::ExtractStringFromFile => {
                Signature { inout: Some(1), ..sig("extract_string_from_file", &[S, I, S, S], Some(S)) }
            }
            Builtin::GetBinaryToFile => sig("get_binary_to_file", &[S, S], Some(I)),
            Builtin::GetHeader => sig("get_header", &[S], Some(S)),
            Builtin::GetHtml => sig("get_html", &[S], Some(I)),
            Builtin::GetHtmlWithDump => sig("get_html_with_dump", &[S, S], Some(I)),
            Builtin::GetHtmlToFile => sig("get_html_to_file", &[S, S], Some(I)),
            Builtin::GetHtmlToFileWithDump => sig("get_html_to_file_with_dump", &[S, S, S], Some(I)),
            Builtin::IntToString => sig("int_to_string", &[I], Some(S)),
            Builtin::LastResponse => sig("last_response", &[], Some(S)),
            Builtin::Length => sig("length", &[S], Some(I)),
            Builtin::LoadCookie => sig("load_cookie", &[S, S, S], Some(S)),
            Builtin::LoadFromFile => sig("load_from_file", &[S], Some(S)),
            Builtin::Post => sig("post", &[S, S], Some(I)),
            Builtin::PostToFile => sig("post_to_file", &[S, S, S], Some(I)),
            Builtin::PostToFileWithDump => sig("post_to_file_with_dump", &[S, S, S, S], Some(I)),
            Builtin::PostWithDump => sig("post_with_dump", &[S, S, S], Some(I)),
            Builtin::SaveCookie => sig("save_cookie", &[S, S, S], None),
            Builtin::SaveToFile => sig("save_to_file", &[S, S], None),
            Builtin::SetHeader => sig("set_header", &[S, S], None),
            Builtin::StringToInt => sig("string_to_int", &[S], Some(I)),
            Builtin::Substring => sig("substring", &[S, I, I], Some(S)),
        }
    }
}

/// Engine-side state the builtins operate on. It lives as long as the engine
/// instance, so HTTP state and the parser survive between executes.
pub struct Host {
    pub temp_dir: PathBuf,
    pub http: HttpSession,
    pub parser: Option<FileParser>,
    /// Set when the current execute created a parser.
    pub parser_ready: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CallOutput {
    pub value: Option<Value>,
    /// New value for the in/out position argument.
    pub position: Option<i64>,
}

impl CallOutput {
    fn value(value: Value) -> Self {
        CallOutput { value: Some(value), position: None }
    }

    fn none() -> Self {
        CallOutput::default()
    }
}

struct Args(Vec<Value>);

impl Args {
    fn str(&self, i: usize) -> RiaResult<&str> {
        self.0
            .get(i)
            .and_then(Value::as_str)
            .ok_or_else(|| RiaError::Message(format!("argument {} must be a string", i + 1)))
    }

    fn int(&self, i: usize) -> RiaResult<i64> {
        self.0
            .get(i)
            .and_then(Value::as_int)
            .ok_or_else(|| RiaError::Message(format!("argument {} must be an int", i + 1)))
    }
}

fn read_optional(path: &Path) -> RiaResult<String> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(RiaError::io(format!("cannot read {}", path.display()), e)),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> RiaResult<()> {
    std::fs::write(path, bytes).map_err(|e| RiaError::io(format!("cannot write {}", path.display()), e))
}

fn extract_with_position(src: &str, pos: i64, begin: &str, end: &str) -> CallOutput {
    let (text, next) = extract::extract(src, pos.max(0) as usize, begin, end);
    CallOutput { value: Some(Value::Str(text)), position: Some(next as i64) }
}

impl Host {
    pub fn new(temp_dir: PathBuf, http: HttpSession) -> Self {
        Host { temp_dir, http, parser: None, parser_ready: false }
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.temp_dir.join(name)
    }

    /// Send a request and return its status code. The body goes to `to_file`
    /// and the raw response to `dump` when those are given.
    fn fetch(
        &mut self,
        method: Method,
        url: &str,
        body: Option<&str>,
        to_file: Option<&str>,
        dump: Option<&str>,
    ) -> RiaResult<Value> {
        let response = self.http.request(method, url, body)?;
        let status = response.status;
        if let Some(file) = to_file {
            write_file(&self.temp_dir.join(file), &response.body)?;
        }
        if let Some(dump) = dump {
            write_file(&self.temp_dir.join(dump), &response.dump())?;
        }
        Ok(Value::Int(i64::from(status)))
    }

    fn parser_mut(&mut self) -> RiaResult<&mut FileParser> {
        self.parser
            .as_mut()
            .ok_or_else(|| RiaError::Message("no parser: call create_parser_for_file first".into()))
    }

    pub fn call(&mut self, builtin: Builtin, args: Vec<Value>) -> RiaResult<CallOutput> {
        debug!(builtin = builtin.signature().name, "builtin call");
        let a = Args(args);
        let out = match builtin {
            Builtin::AddParsingRule => {
                self.parser_mut()?.add_rule(a.str(0)?, a.str(1)?, a.str(2)?, a.str(3)?)?;
                CallOutput::none()
            }
            Builtin::CreateParserForFile => {
                let path = self.temp_path(a.str(0)?);
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| RiaError::io(format!("cannot open {}", path.display()), e))?;
                self.parser = Some(FileParser::new(text, ParserKind::from_name(a.str(1)?)));
                self.parser_ready = true;
                CallOutput::none()
            }
            Builtin::Dehtml => CallOutput::value(Value::Str(extract::dehtml(a.str(0)?))),
            Builtin::ExtractString => extract_with_position(a.str(0)?, a.int(1)?, a.str(2)?, a.str(3)?),
            Builtin::ExtractStringFromFile => {
                let text = read_optional(&self.temp_path(a.str(0)?))?;
                extract_with_position(&text, a.int(1)?, a.str(2)?, a.str(3)?)
            }
            Builtin::GetBinaryToFile => {
                CallOutput::value(self.fetch(Method::Get, a.str(1)?, None, Some(a.str(0)?), None)?)
            }
            Builtin::GetHeader => CallOutput::value(Value::Str(self.http.last_header(a.str(0)?))),
            Builtin::GetHtml => CallOutput::value(self.fetch(Method::Get, a.str(0)?, None, None, None)?),
            Builtin::GetHtmlWithDump => {
                CallOutput::value(self.fetch(Method::Get, a.str(0)?, None, None, Some(a.str(1)?))?)
            }
            Builtin::GetHtmlToFile => {
                CallOutput::value(self.fetch(Method::Get, a.str(1)?, None, Some(a.str(0)?), None)?)
            }
            Builtin::GetHtmlToFileWithDump => CallOutput::value(self.fetch(
                Method::Get,
                a.str(1)?,
                None,
                Some(a.str(0)?),
                Some(a.str(2)?),
            )?),
            Builtin::IntToString => CallOutput::value(Value::Str(a.int(0)?.to_string())),
            Builtin::LastResponse => CallOutput::value(Value::Str(self.http.last_text())),
            Builtin::Length => CallOutput::value(Value::Int(a.str(0)?.len() as i64)),
            Builtin::LoadCookie => {
                let jar = CookieJar::load(&cookie_path(&self.temp_dir, a.str(0)?))?;
                let key = a.str(2)?;
                let value = jar.get(key).unwrap_or_default().to_string();
                if !value.is_empty() {
                    self.http.queue_cookie(key, &value);
                }
                CallOutput::value(Value::Str(value))
            }
            Builtin::LoadFromFile => CallOutput::value(Value::Str(read_optional(Path::new(a.str(0)?))?)),
            Builtin::Post => {
                CallOutput::value(self.fetch(Method::Post, a.str(0)?, Some(a.str(1)?), None, None)?)
            }
            Builtin::PostToFile => CallOutput::value(self.fetch(
                Method::Post,
                a.str(1)?,
                Some(a.str(2)?),
                Some(a.str(0)?),
                None,
            )?),
            Builtin::PostToFileWithDump => CallOutput::value(self.fetch(
                Method::Post,
                a.str(1)?,
                Some(a.str(2)?),
                Some(a.str(0)?),
                Some(a.str(3)?),
            )?),
            Builtin::PostWithDump => CallOutput::value(self.fetch(
                Method::Post,
                a.str(0)?,
                Some(a.str(1)?),
                None,
                Some(a.str(2)?),
            )?),
            Builtin::SaveCookie => {
                let site = a.str(0)?;
                let path = cookie_path(&self.temp_dir, site);
                let mut jar = CookieJar::load(&path)?;
                let set_cookies: Vec<&str> = self
                    .http
                    .last_response()
                    .map(|r| r.header_values("set-cookie").collect())
                    .unwrap_or_default();
                if jar.absorb(site, a.str(2)?, set_cookies) > 0 {
                    jar.save(&path)?;
                }
                CallOutput::none()
            }
            Builtin::SaveToFile => {
                write_file(Path::new(a.str(0)?), a.str(1)?.as_bytes())?;
                CallOutput::none()
            }
            Builtin::SetHeader => {
                self.http.set_header(a.str(0)?, a.str(1)?);
                CallOutput::none()
            }
            Builtin::StringToInt => CallOutput::value(Value::Int(extract::string_to_int(a.str(0)?))),
            Builtin::Substring => {
                CallOutput::value(Value::Str(extract::substring(a.str(0)?, a.int(1)?, a.int(2)?)))
            }
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{CannedTransport, HttpResponse};

    fn host(dir: &Path, transport: &CannedTransport) -> Host {
        Host::new(dir.to_path_buf(), HttpSession::new(transport.factory()))
    }

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    #[test]
    fn test_every_builtin_has_a_unique_name() {
        let mut names: Vec<_> = Builtin::ALL.iter().map(|b| b.signature().name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Builtin::ALL.len());
        for b in Builtin::ALL {
            assert_eq!(Builtin::lookup(b.signature().name), Some(b));
        }
        assert_eq!(Builtin::lookup("GET_HTML"), Some(Builtin::GetHtml));
        assert_eq!(Builtin::lookup("nope"), None);
    }

    #[test]
    fn test_extract_string_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = host(dir.path(), &CannedTransport::new());
        let out = h
            .call(Builtin::ExtractString, vec![s("x=1;y=2;"), Value::Int(0), s("y="), s(";")])
            .unwrap();
        assert_eq!(out, CallOutput { value: Some(s("2")), position: Some(8) });
    }

    #[test]
    fn test_get_html_to_file_with_dump() {
        let dir = tempfile::tempdir().unwrap();
        let transport = CannedTransport::new().with_response(HttpResponse::new(200, "<html/>"));
        let mut h = host(dir.path(), &transport);
        let out = h
            .call(Builtin::GetHtmlToFileWithDump, vec![s("page.html"), s("http://h/p"), s("dump.txt")])
            .unwrap();
        assert_eq!(out.value, Some(Value::Int(200)));
        assert_eq!(std::fs::read_to_string(dir.path().join("page.html")).unwrap(), "<html/>");
        let dump = std::fs::read_to_string(dir.path().join("dump.txt")).unwrap();
        assert!(dump.starts_with("HTTP/1.1 200"));
        assert_eq!(transport.requests()[0].url, "http://h/p");
    }

    #[test]
    fn test_post_sends_values_and_caches_response() {
        let dir = tempfile::tempdir().unwrap();
        let transport = CannedTransport::new()
            .with_response(HttpResponse::new(302, "moved").with_header("Location", "/home"));
        let mut h = host(dir.path(), &transport);
        let out = h.call(Builtin::Post, vec![s("http://h/login"), s("user=a&pass=b")]).unwrap();
        assert_eq!(out.value, Some(Value::Int(302)));
        assert_eq!(transport.requests()[0].method, Method::Post);
        assert_eq!(transport.requests()[0].body.as_deref(), Some("user=a&pass=b"));
        assert_eq!(h.call(Builtin::LastResponse, vec![]).unwrap().value, Some(s("moved")));
        assert_eq!(h.call(Builtin::GetHeader, vec![s("location")]).unwrap().value, Some(s("/home")));
    }

    #[test]
    fn test_cookie_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let transport = CannedTransport::new()
            .with_response(HttpResponse::new(200, "").with_header("Set-Cookie", "sid=xyz; Domain=.site.org"))
            .with_response(HttpResponse::new(200, ""));
        let mut h = host(dir.path(), &transport);
        h.call(Builtin::GetHtml, vec![s("http://www.site.org/")]).unwrap();
        h.call(Builtin::SaveCookie, vec![s("www.site.org"), s("user"), s("*")]).unwrap();
        assert!(dir.path().join("www_site_org").exists());

        let loaded = h.call(Builtin::LoadCookie, vec![s("www.site.org"), s("user"), s("sid")]).unwrap();
        assert_eq!(loaded.value, Some(s("xyz")));
        h.call(Builtin::GetHtml, vec![s("/next")]).unwrap();
        let requests = transport.requests();
        let second = &requests[1];
        assert!(second.headers.contains(&("Cookie".to_string(), "sid=xyz".to_string())));
    }

    #[test]
    fn test_file_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = host(dir.path(), &CannedTransport::new());
        let path = dir.path().join("note.txt");
        let path_str = path.to_string_lossy().to_string();
        h.call(Builtin::SaveToFile, vec![s(&path_str), s("a=1")]).unwrap();
        assert_eq!(h.call(Builtin::LoadFromFile, vec![s(&path_str)]).unwrap().value, Some(s("a=1")));
        let missing = dir.path().join("missing.txt").to_string_lossy().to_string();
        assert_eq!(h.call(Builtin::LoadFromFile, vec![s(&missing)]).unwrap().value, Some(s("")));

        std::fs::write(dir.path().join("data.txt"), "[k]v[/k]").unwrap();
        let out = h
            .call(Builtin::ExtractStringFromFile, vec![s("data.txt"), Value::Int(0), s("[k]"), s("[/k]")])
            .unwrap();
        assert_eq!(out.value, Some(s("v")));
    }

    #[test]
    fn test_parser_builtins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("list.json"), r#"{"a":"1"}"#).unwrap();
        let mut h = host(dir.path(), &CannedTransport::new());
        assert!(h.call(Builtin::AddParsingRule, vec![s("a"), s("\"a\":\""), s("\""), s("")]).is_err());
        h.call(Builtin::CreateParserForFile, vec![s("list.json"), s("json")]).unwrap();
        assert!(h.parser_ready);
        h.call(Builtin::AddParsingRule, vec![s("a"), s("\"a\":\""), s("\""), s("")]).unwrap();
        let mut pos = 0;
        let parser = h.parser.as_mut().unwrap();
        assert_eq!(parser.apply("a", &mut pos).unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_string_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = host(dir.path(), &CannedTransport::new());
        assert_eq!(h.call(Builtin::Length, vec![s("abc")]).unwrap().value, Some(Value::Int(3)));
        assert_eq!(h.call(Builtin::IntToString, vec![Value::Int(0)]).unwrap().value, Some(s("0")));
        assert_eq!(h.call(Builtin::StringToInt, vec![s("12a")]).unwrap().value, Some(Value::Int(-1)));
        assert_eq!(
            h.call(Builtin::Substring, vec![s("abcdef"), Value::Int(1), Value::Int(2)]).unwrap().value,
            Some(s("bc"))
        );
        assert_eq!(h.call(Builtin::Dehtml, vec![s("a&quot;b")]).unwrap().value, Some(s("a\"b")));
    }
}
