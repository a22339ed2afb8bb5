//! HTTP collaborator over a blocking `ureq` agent.
//!
//! ## Endpoints (relative to the base URL)
//!
//! | Operation        | Request                                                       |
//! |------------------|---------------------------------------------------------------|
//! | catalog          | `GET  projects/{id}/catalog?scope={all\|name}`                 |
//! | raster convert   | `POST projects/{id}/renditions/convert` `{scope, paths}`      |
//! | rasterize        | `POST projects/{id}/renditions/rasterize?class=` XML document |
//! | move renditions  | `POST renditions/move` form `projectId, assetType, pairs`     |
//! | remove renditions| `POST renditions/remove` form `projectId, assetType, paths`   |
//! | object get/put   | `GET/PUT/DELETE projects/{id}/files/{path}`                   |
//! | thumbnail        | `POST thumbnails?max_size=` raw bytes                         |
//!
//! Every request shares the agent timeout from `request_timeout_secs`. The
//! project id and each `/`-separated segment of `{path}` are percent-encoded.

use std::io::Read;
use std::path::PathBuf;

use serde::Deserialize;

use rendition_core::{AssetClass, CatalogEntry, CatalogScope, ProjectId, RenditionConfig};

use crate::error::RemoteError;
use crate::remote::{
    encode_move_pairs, encode_remove_paths, CatalogSource, RasterConverter, RasterizeOutput,
    RasterizeRequest, Rasterizer, RenderedBinary, RenditionReader, RenditionStore, Thumbnailer,
};

#[derive(Debug, Deserialize)]
struct CreatedCount {
    created: usize,
}

#[derive(Debug, Deserialize)]
struct MovedCount {
    moved: usize,
}

#[derive(Debug, Deserialize)]
struct RemovedCount {
    removed: usize,
}

/// Rasterizer reply: binaries by URI, or a mailbox directory.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RasterizeReply {
    Outputs(Vec<OutputRef>),
    Mailbox(PathBuf),
}

#[derive(Debug, Deserialize)]
struct OutputRef {
    source_path: String,
    #[serde(default)]
    sub_id: Option<String>,
    #[serde(default)]
    language: Option<String>,
    url: String,
}

/// Remote asset service reached over HTTP.
#[derive(Clone)]
pub struct HttpRemote {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, config: &RenditionConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.request_timeout())
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/{}", self.base_url, tail)
    }

    /// `projects/{id}/{tail}` with the id percent-encoded.
    fn project_url(&self, project: &ProjectId, tail: &str) -> String {
        self.url(&format!("projects/{}/{tail}", urlencoding::encode(&project.0)))
    }

    fn file_url(&self, project: &ProjectId, path: &str) -> String {
        let encoded: Vec<_> = path.split('/').map(urlencoding::encode).collect();
        self.project_url(project, &format!("files/{}", encoded.join("/")))
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        let response = self.agent.get(url).call()?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| RemoteError::Http(format!("reading {url}: {e}")))?;
        Ok(bytes)
    }
}

fn decode<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T, RemoteError> {
    let url = response.get_url().to_string();
    response
        .into_json()
        .map_err(|e| RemoteError::Protocol(format!("{url}: {e}")))
}

impl CatalogSource for HttpRemote {
    fn fetch_catalog(
        &self,
        project: &ProjectId,
        scope: &CatalogScope,
    ) -> Result<Vec<CatalogEntry>, RemoteError> {
        let response = self
            .agent
            .get(&self.project_url(project, "catalog"))
            .query("scope", scope.as_query())
            .call()?;
        decode(response)
    }
}

impl RasterConverter for HttpRemote {
    fn convert_images(
        &self,
        project: &ProjectId,
        scope: &CatalogScope,
        paths: &[String],
    ) -> Result<usize, RemoteError> {
        let response = self
            .agent
            .post(&self.project_url(project, "renditions/convert"))
            .send_json(serde_json::json!({
                "projectId": project.0,
                "scope": scope.as_query(),
                "paths": paths,
            }))?;
        Ok(decode::<CreatedCount>(response)?.created)
    }
}

impl Rasterizer for HttpRemote {
    fn rasterize(&self, request: &RasterizeRequest<'_>) -> Result<RasterizeOutput, RemoteError> {
        let response = self
            .agent
            .post(&self.project_url(request.project, "renditions/rasterize"))
            .query("class", request.class.as_str())
            .set("Content-Type", "application/xml")
            .send_string(request.document)?;

        match decode::<RasterizeReply>(response)? {
            RasterizeReply::Mailbox(dir) => Ok(RasterizeOutput::Mailbox(dir)),
            RasterizeReply::Outputs(outputs) => {
                let mut binaries = Vec::with_capacity(outputs.len());
                for output in outputs {
                    binaries.push(RenderedBinary {
                        bytes: self.fetch_bytes(&output.url)?,
                        source_path: output.source_path,
                        sub_id: output.sub_id,
                        language: output.language,
                    });
                }
                Ok(RasterizeOutput::Binaries(binaries))
            }
        }
    }
}

impl RenditionStore for HttpRemote {
    fn move_renditions(
        &self,
        project: &ProjectId,
        class: AssetClass,
        pairs: &[(String, String)],
    ) -> Result<usize, RemoteError> {
        let payload = encode_move_pairs(pairs);
        let response = self.agent.post(&self.url("renditions/move")).send_form(&[
            ("projectId", project.0.as_str()),
            ("assetType", class.as_str()),
            ("pairs", payload.as_str()),
        ])?;
        Ok(decode::<MovedCount>(response)?.moved)
    }

    fn remove_renditions(
        &self,
        project: &ProjectId,
        class: AssetClass,
        paths: &[String],
    ) -> Result<usize, RemoteError> {
        let payload = encode_remove_paths(paths);
        let response = self.agent.post(&self.url("renditions/remove")).send_form(&[
            ("projectId", project.0.as_str()),
            ("assetType", class.as_str()),
            ("paths", payload.as_str()),
        ])?;
        Ok(decode::<RemovedCount>(response)?.removed)
    }

    fn open(&self, project: &ProjectId, path: &str) -> Result<RenditionReader, RemoteError> {
        let url = self.file_url(project, path);
        let response = self.agent.get(&url).call()?;
        let declared = response
            .header("Content-Length")
            .and_then(|v| v.parse::<u64>().ok());
        match declared {
            Some(declared_len) => Ok(RenditionReader {
                declared_len,
                reader: Box::new(response.into_reader()),
            }),
            // Chunked body: buffer it so the length is known.
            None => {
                let mut bytes = Vec::new();
                response
                    .into_reader()
                    .read_to_end(&mut bytes)
                    .map_err(|e| RemoteError::Http(format!("reading {url}: {e}")))?;
                Ok(RenditionReader {
                    declared_len: bytes.len() as u64,
                    reader: Box::new(std::io::Cursor::new(bytes)),
                })
            }
        }
    }

    fn put(&self, project: &ProjectId, path: &str, bytes: &[u8]) -> Result<(), RemoteError> {
        self.agent
            .put(&self.file_url(project, path))
            .set("Content-Type", "application/octet-stream")
            .send_bytes(bytes)?;
        Ok(())
    }

    fn delete(&self, project: &ProjectId, path: &str) -> Result<(), RemoteError> {
        match self.agent.delete(&self.file_url(project, path)).call() {
            Ok(_) => Ok(()),
            Err(err) => match RemoteError::from(err) {
                RemoteError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }
}

impl Thumbnailer for HttpRemote {
    fn thumbnail(&self, bytes: &[u8], max_size: u32) -> Result<Vec<u8>, RemoteError> {
        let url = self.url("thumbnails");
        let response = self
            .agent
            .post(&url)
            .query("max_size", &max_size.to_string())
            .set("Content-Type", "application/octet-stream")
            .send_bytes(bytes)?;
        let mut out = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut out)
            .map_err(|e| RemoteError::Http(format!("reading {url}: {e}")))?;
        Ok(out)
    }
}
