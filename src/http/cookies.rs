//! Cookie files kept in the engine's temp directory, one per site.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{RiaError, RiaResult};

/// `temp_dir/<site with '.' replaced by '_'>`.
pub fn cookie_path(temp_dir: &Path, site: &str) -> PathBuf {
    temp_dir.join(site.replace('.', "_"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
}

/// Parse the `name=value` pair and `Domain` attribute of a `Set-Cookie` value.
pub fn parse_set_cookie(header: &str) -> Option<SetCookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let domain = parts.filter_map(|attr| attr.split_once('=')).find_map(|(k, v)| {
        k.trim().eq_ignore_ascii_case("domain").then(|| v.trim().trim_start_matches('.').to_ascii_lowercase())
    });
    Some(SetCookie { name: name.to_string(), value: value.trim().to_string(), domain })
}

/// Whether a cookie scoped to `domain` applies to `site`.
pub fn domain_matches(site: &str, domain: &str) -> bool {
    let site = site.to_ascii_lowercase();
    site == domain || site.ends_with(&format!(".{domain}"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: Vec<(String, String)>,
}

impl CookieJar {
    /// Read a jar file; a missing file is an empty jar.
    pub fn load(path: &Path) -> RiaResult<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CookieJar::default()),
            Err(e) => return Err(RiaError::io(format!("cannot read cookies {}", path.display()), e)),
        };
        let entries = text
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(CookieJar { entries })
    }

    pub fn save(&self, path: &Path) -> RiaResult<()> {
        let text: String = self.entries.iter().map(|(k, v)| format!("{k}={v}\n")).collect();
        std::fs::write(path, text)
            .map_err(|e| RiaError::io(format!("cannot write cookies {}", path.display()), e))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store the `Set-Cookie` values that apply to `site` and match `key`
    /// (`*` takes all). Returns how many were stored.
    pub fn absorb<'a>(&mut self, site: &str, key: &str, set_cookies: impl IntoIterator<Item = &'a str>) -> usize {
        let mut stored = 0;
        for cookie in set_cookies.into_iter().filter_map(parse_set_cookie) {
            if let Some(domain) = &cookie.domain {
                if !domain_matches(site, domain) {
                    continue;
                }
            }
            if key != "*" && !cookie.name.eq_ignore_ascii_case(key) {
                continue;
            }
            self.set(&cookie.name, &cookie.value);
            stored += 1;
        }
        stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_path_replaces_dots() {
        assert_eq!(cookie_path(Path::new("/tmp"), "www.afisha.ru"), PathBuf::from("/tmp/www_afisha_ru"));
    }

    #[test]
    fn test_parse_set_cookie() {
        let c = parse_set_cookie("sid=abc123; Path=/; Domain=.Example.org; HttpOnly").unwrap();
        assert_eq!(c.name, "sid");
        assert_eq!(c.value, "abc123");
        assert_eq!(c.domain.as_deref(), Some("example.org"));
        assert!(parse_set_cookie("garbage").is_none());
        assert_eq!(parse_set_cookie("a=").unwrap().value, "");
    }

    #[test]
    fn test_domain_matching() {
        assert!(domain_matches("www.example.org", "example.org"));
        assert!(domain_matches("example.org", "example.org"));
        assert!(!domain_matches("badexample.org", "example.org"));
    }

    #[test]
    fn test_absorb_filters_by_domain_and_key() {
        let mut jar = CookieJar::default();
        let headers = ["sid=1; Domain=example.org", "lang=ru", "other=2; Domain=elsewhere.net"];
        assert_eq!(jar.absorb("www.example.org", "*", headers), 2);
        assert_eq!(jar.get("sid"), Some("1"));
        assert_eq!(jar.get("other"), None);

        let mut only_lang = CookieJar::default();
        assert_eq!(only_lang.absorb("www.example.org", "LANG", headers), 1);
        assert_eq!(only_lang.len(), 1);
    }

    #[test]
    fn test_jar_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = cookie_path(dir.path(), "example.org");
        assert!(CookieJar::load(&path).unwrap().is_empty());
        let mut jar = CookieJar::default();
        jar.set("sid", "1");
        jar.set("sid", "2");
        jar.save(&path).unwrap();
        let loaded = CookieJar::load(&path).unwrap();
        assert_eq!(loaded.get("SID"), Some("2"));
        assert_eq!(loaded.len(), 1);
    }
}
