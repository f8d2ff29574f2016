use crate::error::RemoteError;
use crate::remote::{RemoteEntry, RemoteFileStore, RemoteStat};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode, Url};
use std::io::Read;
use std::time::Duration;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getlastmodified/>
  </d:prop>
</d:propfind>"#;

/// One `<response>` element of a PROPFIND multistatus body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavResource {
    pub href: String,
    pub is_collection: bool,
    pub length: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl DavResource {
    fn name(&self) -> String {
        self.href
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Debug)]
pub struct WebDavStore {
    client: Client,
    base: Url,
    user: Option<String>,
    password: Option<String>,
}

fn decode_path(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn href_path(raw: &str) -> String {
    let trimmed = raw.trim();
    let path = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Url::parse(trimmed)
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| trimmed.to_string())
    } else {
        trimmed.to_string()
    };
    decode_path(&path)
}

#[derive(Debug, Clone, Copy)]
enum DavField {
    Href,
    Length,
    LastModified,
}

pub fn parse_multistatus(xml: &str) -> Result<Vec<DavResource>, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut out = Vec::new();
    let mut current: Option<DavResource> = None;
    let mut field: Option<DavField> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"response" => current = Some(DavResource::default()),
                b"href" => field = Some(DavField::Href),
                b"getcontentlength" => field = Some(DavField::Length),
                b"getlastmodified" => field = Some(DavField::LastModified),
                b"collection" => {
                    if let Some(resource) = current.as_mut() {
                        resource.is_collection = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"collection" {
                    if let Some(resource) = current.as_mut() {
                        resource.is_collection = true;
                    }
                }
            }
            Ok(Event::Text(text)) => {
                let (Some(kind), Some(resource)) = (field, current.as_mut()) else {
                    continue;
                };
                let value = text.unescape().map_err(|err| err.to_string())?;
                let value = value.trim();
                match kind {
                    DavField::Href => resource.href = href_path(value),
                    DavField::Length => resource.length = value.parse::<u64>().ok(),
                    DavField::LastModified => {
                        resource.last_modified = DateTime::parse_from_rfc2822(value)
                            .ok()
                            .map(|at| at.with_timezone(&Utc));
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"response" => {
                    if let Some(resource) = current.take() {
                        out.push(resource);
                    }
                }
                b"href" | b"getcontentlength" | b"getlastmodified" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(format!(
                    "xml error at byte {}: {err}",
                    reader.buffer_position()
                ));
            }
            Ok(_) => {}
        }
    }

    Ok(out)
}

impl WebDavStore {
    pub fn new(
        base_uri: &str,
        user: Option<String>,
        password: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, RemoteError> {
        let mut base =
            Url::parse(base_uri).map_err(|_| RemoteError::InvalidLocation(base_uri.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| RemoteError::Transport {
                op: "building client for",
                path: base_uri.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            base,
            user: user.filter(|u| !u.is_empty()),
            password,
        })
    }

    fn url_for(&self, path: &str, collection: bool) -> Result<Url, RemoteError> {
        let mut relative = path
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if collection && !relative.is_empty() {
            relative.push('/');
        }
        self.base
            .join(&relative)
            .map_err(|_| RemoteError::InvalidLocation(path.to_string()))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.user {
            Some(user) => builder.basic_auth(user, self.password.as_ref()),
            None => builder,
        }
    }

    fn propfind(
        &self,
        path: &str,
        depth: &str,
        collection: bool,
        op: &'static str,
    ) -> Result<Option<(Url, Vec<DavResource>)>, RemoteError> {
        let url = self.url_for(path, collection)?;
        let method = Method::from_bytes(b"PROPFIND").map_err(|_| RemoteError::Malformed {
            path: path.to_string(),
            reason: "PROPFIND method unsupported".to_string(),
        })?;
        let response = self
            .request(method, url.clone())
            .header("Depth", depth)
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
            .send()
            .map_err(|source| RemoteError::Transport {
                op,
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RemoteError::Unavailable {
                op,
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(|source| RemoteError::Transport {
            op,
            path: path.to_string(),
            source,
        })?;
        let resources = parse_multistatus(&body).map_err(|reason| RemoteError::Malformed {
            path: path.to_string(),
            reason,
        })?;
        Ok(Some((url, resources)))
    }
}

impl RemoteFileStore for WebDavStore {
    fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let Some((url, resources)) = self.propfind(path, "1", true, "listing")? else {
            return Ok(Vec::new());
        };

        let own_path = decode_path(url.path());
        let own_path = own_path.trim_end_matches('/');
        Ok(resources
            .into_iter()
            .filter(|resource| resource.href.trim_end_matches('/') != own_path)
            .map(|resource| RemoteEntry {
                name: resource.name(),
                is_directory: resource.is_collection,
                length: resource.length,
                last_modified: resource.last_modified,
            })
            .filter(|entry| !entry.name.is_empty())
            .collect())
    }

    fn stat(&self, path: &str) -> Result<RemoteStat, RemoteError> {
        let Some((_, resources)) = self.propfind(path, "0", false, "stat")? else {
            return Ok(RemoteStat::missing());
        };
        let Some(resource) = resources.into_iter().next() else {
            return Err(RemoteError::Malformed {
                path: path.to_string(),
                reason: "multistatus without response element".to_string(),
            });
        };
        Ok(RemoteStat {
            exists: true,
            length: resource.length,
            last_modified: resource.last_modified,
        })
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, RemoteError> {
        let url = self.url_for(path, false)?;
        let response = self
            .request(Method::GET, url)
            .send()
            .map_err(|source| RemoteError::Transport {
                op: "reading",
                path: path.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(RemoteError::Unavailable {
                op: "reading",
                path: path.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(Box::new(response))
    }

    fn delete_file(&self, path: &str) -> Result<bool, RemoteError> {
        let url = self.url_for(path, false)?;
        let response = self
            .request(Method::DELETE, url)
            .send()
            .map_err(|source| RemoteError::Transport {
                op: "deleting",
                path: path.to_string(),
                source,
            })?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(RemoteError::Unavailable {
                op: "deleting",
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(true)
    }
}
