//! Build-service implementation over the REST/XML API.

use anyhow::anyhow;
use async_trait::async_trait;
use log::{debug, info};
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::{Client, Url};

use crate::error::{ObsError, Result};
use crate::http::{HttpClient, non_retryable_status};
use crate::xml::XmlBuilder;

use super::{BuildService, parse_directory};

pub const DEFAULT_API_URL: &str = "https://api.opensuse.org";

/// Client for one build-service instance.
pub struct ObsClient {
    http_client: HttpClient,
    api_url: String,
}

impl ObsClient {
    /// Create a client for the given API URL.
    pub fn new(client: Client, api_url: &str) -> Self {
        Self::from_http_client(HttpClient::new(client), api_url)
    }

    /// Create from an existing HttpClient.
    pub fn from_http_client(http_client: HttpClient, api_url: &str) -> Self {
        Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// API URL with `segments` appended, each percent-encoded as one path segment.
    fn url(&self, segments: &[&str]) -> Result<String> {
        let api_url = &self.api_url;
        let mut url = Url::parse(api_url)
            .map_err(|e| ObsError::Transport(anyhow!("invalid API URL {}: {}", api_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ObsError::Transport(anyhow!("API URL {} cannot have a path", api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    /// Delete a project and everything in it. A missing project is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_project(&self, project: &str) -> Result<()> {
        info!("deleting project {}", project);
        let url = self.url(&["source", project])?;
        ignore_status(self.http_client.delete(&url, &[("force", "1")]).await, &[404])
    }

    /// Create or replace the meta document of a package.
    #[tracing::instrument(skip(self, meta))]
    pub async fn save_package_meta(&self, project: &str, package: &str, meta: &str) -> Result<()> {
        let url = self.url(&["source", project, package, "_meta"])?;
        self.http_client.put_text(&url, meta.to_string()).await?;
        debug!("created {}/{}", project, package);
        Ok(())
    }

    /// Delete a package. A missing package is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_package(&self, project: &str, package: &str) -> Result<()> {
        info!("deleting package {}/{}", project, package);
        let url = self.url(&["source", project, package])?;
        ignore_status(self.http_client.delete(&url, &[]).await, &[404])
    }

    /// Commit a single file into a package.
    #[tracing::instrument(skip(self, content))]
    pub async fn put_file(
        &self,
        project: &str,
        package: &str,
        filename: &str,
        content: &str,
    ) -> Result<()> {
        let url = self.url(&["source", project, package, filename])?;
        self.http_client.put_text(&url, content.to_string()).await?;
        Ok(())
    }

    /// Make `target_project/target_package` a source link to
    /// `source_project/source_package`.
    #[tracing::instrument(skip(self))]
    pub async fn create_package_link(
        &self,
        source_project: &str,
        source_package: &str,
        target_project: &str,
        target_package: &str,
    ) -> Result<()> {
        let mut xml = XmlBuilder::new();
        xml.empty(
            "link",
            &[("project", source_project), ("package", source_package)],
        )?;
        self.put_file(target_project, target_package, "_link", &xml.finish())
            .await
    }

    /// Create a group, or replace its member list if it exists.
    #[tracing::instrument(skip(self))]
    pub async fn save_group(&self, name: &str, users: &[String]) -> Result<()> {
        let mut xml = XmlBuilder::new();
        xml.open("group", &[])?.text_element("title", name)?;
        if !users.is_empty() {
            xml.open("person", &[])?;
            for user in users {
                xml.empty("person", &[("userid", user)])?;
            }
            xml.close("person")?;
        }
        xml.close("group")?;

        let url = self.url(&["group", name])?;
        self.http_client.put_text(&url, xml.finish()).await?;
        Ok(())
    }

    /// Delete a group. A missing group is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_group(&self, name: &str) -> Result<()> {
        let url = self.url(&["group", name])?;
        ignore_status(self.http_client.delete(&url, &[]).await, &[404])
    }

    /// Register a confirmed user, optionally setting its password.
    #[tracing::instrument(skip(self, password))]
    pub async fn save_person(&self, name: &str, password: Option<&str>) -> Result<()> {
        let email = format!("{}@example.com", name);
        let mut xml = XmlBuilder::new();
        xml.open("person", &[])?
            .text_element("login", name)?
            .text_element("email", &email)?
            .text_element("state", "confirmed")?
            .close("person")?;

        let url = self.url(&["person", name])?;
        self.http_client.put_text(&url, xml.finish()).await?;

        if let Some(password) = password {
            self.http_client
                .post_text(
                    &url,
                    &[("cmd", "change_password")],
                    Some(password.to_string()),
                )
                .await?;
        }
        Ok(())
    }

    /// Submit a request document and return the id the service assigned.
    #[tracing::instrument(skip(self, request))]
    pub async fn create_request(&self, request: &str) -> Result<String> {
        let url = self.url(&["request"])?;
        let response = self
            .http_client
            .post_text(&url, &[("cmd", "create")], Some(request.to_string()))
            .await?;
        request_id(&response)
            .ok_or_else(|| ObsError::Transport(anyhow!("request created without an id")))
    }

    /// Move a request to `state`. Requests already gone or no longer
    /// modifiable (403/404) are left as they are.
    #[tracing::instrument(skip(self))]
    pub async fn change_request_state(&self, id: &str, state: &str) -> Result<()> {
        info!("changing request state of {} to {}", id, state);
        let url = self.url(&["request", id])?;
        let result = self
            .http_client
            .post_text(&url, &[("cmd", "changestate"), ("newstate", state)], None)
            .await;
        ignore_status(result, &[403, 404])
    }

    /// Raw document of a request.
    #[tracing::instrument(skip(self))]
    pub async fn get_request(&self, id: &str) -> Result<String> {
        let url = self.url(&["request", id])?;
        Ok(self.http_client.get_text(&url, &[]).await?)
    }
}

#[async_trait]
impl BuildService for ObsClient {
    #[tracing::instrument(skip(self))]
    async fn fetch_project_meta(&self, project: &str) -> Result<String> {
        let url = self.url(&["source", project, "_meta"])?;
        self.http_client
            .get_text(&url, &[])
            .await
            .map_err(|e| project_error(project, e))
    }

    #[tracing::instrument(skip(self, meta))]
    async fn save_project_meta(&self, project: &str, meta: &str) -> Result<()> {
        let url = self.url(&["source", project, "_meta"])?;
        self.http_client.put_text(&url, meta.to_string()).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_packages(&self, project: &str) -> Result<Vec<String>> {
        let url = self.url(&["source", project])?;
        let listing = self
            .http_client
            .get_text(&url, &[])
            .await
            .map_err(|e| project_error(project, e))?;
        parse_directory(project, &listing)
    }
}

fn project_error(project: &str, e: anyhow::Error) -> ObsError {
    if non_retryable_status(&e) == Some(404) {
        ObsError::ProjectNotFound(project.to_string())
    } else {
        ObsError::Transport(e)
    }
}

fn ignore_status(result: anyhow::Result<String>, tolerated: &[u16]) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) => match non_retryable_status(&e) {
            Some(status) if tolerated.contains(&status) => {
                debug!("ignoring HTTP {}: {}", status, e);
                Ok(())
            }
            _ => Err(ObsError::Transport(e)),
        },
    }
}

/// Reads the `id` attribute of a `<request>` root element.
fn request_id(content: &str) -> Option<String> {
    let mut reader = Reader::from_str(content);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.name().as_ref() != b"request" {
                    return None;
                }
                let attr = e.try_get_attribute("id").ok()??;
                return attr.unescape_value().ok().map(|v| v.into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}
