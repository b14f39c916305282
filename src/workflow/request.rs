use log::info;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;

use crate::error::{ObsError, Result};
use crate::obs::ObsClient;
use crate::xml::XmlBuilder;

/// One review entry of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Review {
    pub state: String,
    pub by_user: Option<String>,
    pub by_group: Option<String>,
    pub by_project: Option<String>,
    pub by_package: Option<String>,
}

/// Handle to a request created on the build service.
pub struct Request<'a> {
    client: &'a ObsClient,
    id: String,
    revoked: bool,
}

impl<'a> Request<'a> {
    /// Create a submit request from `source_project/package` to `target_project`.
    /// The target package defaults to the source package.
    #[tracing::instrument(skip(client, description))]
    pub async fn submit(
        client: &'a ObsClient,
        source_project: &str,
        package: &str,
        target_project: &str,
        target_package: Option<&str>,
        description: &str,
    ) -> Result<Self> {
        let mut xml = XmlBuilder::new();
        xml.open("request", &[])?
            .open("action", &[("type", "submit")])?
            .empty("source", &[("project", source_project), ("package", package)])?
            .empty(
                "target",
                &[
                    ("project", target_project),
                    ("package", target_package.unwrap_or(package)),
                ],
            )?
            .close("action")?
            .text_element("description", description)?
            .close("request")?;

        Self::create(client, &xml.finish()).await
    }

    /// Create a request deleting `project`, or only `package` in it.
    #[tracing::instrument(skip(client, description))]
    pub async fn delete(
        client: &'a ObsClient,
        project: &str,
        package: Option<&str>,
        description: &str,
    ) -> Result<Self> {
        let mut target = vec![("project", project)];
        if let Some(package) = package {
            target.push(("package", package));
        }

        let mut xml = XmlBuilder::new();
        xml.open("request", &[])?
            .open("action", &[("type", "delete")])?
            .empty("target", &target)?
            .close("action")?
            .text_element("description", description)?
            .close("request")?;

        Self::create(client, &xml.finish()).await
    }

    async fn create(client: &'a ObsClient, document: &str) -> Result<Self> {
        let id = client.create_request(document).await?;
        info!("created request {}", id);
        Ok(Self {
            client,
            id,
            revoked: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn change_state(&self, state: &str) -> Result<()> {
        self.client.change_request_state(&self.id, state).await
    }

    /// Revoke the request. Only the first call reaches the service.
    pub async fn revoke(&mut self) -> Result<()> {
        if self.revoked {
            return Ok(());
        }
        self.change_state("revoked").await?;
        self.revoked = true;
        Ok(())
    }

    /// Reviews currently attached to the request.
    #[tracing::instrument(skip(self), fields(id = %self.id))]
    pub async fn reviews(&self) -> Result<Vec<Review>> {
        let content = self.client.get_request(&self.id).await?;
        parse_reviews(&self.id, &content)
    }
}

/// Every `<review>` element in a request document, at any depth.
pub fn parse_reviews(id: &str, content: &str) -> Result<Vec<Review>> {
    let subject = format!("request {}", id);
    let mut reader = Reader::from_str(content);
    let mut reviews = Vec::new();

    loop {
        match reader
            .read_event()
            .map_err(|e| ObsError::malformed(&subject, e))?
        {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"review" => {
                reviews.push(review(&subject, &e)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(reviews)
}

fn review(subject: &str, e: &BytesStart<'_>) -> Result<Review> {
    let mut review = Review::default();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ObsError::malformed(subject, err))?;
        let value = attr
            .unescape_value()
            .map_err(|err| ObsError::malformed(subject, err))?
            .into_owned();
        match attr.key.as_ref() {
            b"state" => review.state = value,
            b"by_user" => review.by_user = Some(value),
            b"by_group" => review.by_group = Some(value),
            b"by_project" => review.by_project = Some(value),
            b"by_package" => review.by_package = Some(value),
            _ => {}
        }
    }
    Ok(review)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use reqwest::Client;

    const REQUEST: &str = r#"<request id="42" creator="alice">
  <action type="submit">
    <source project="home:alice" package="wine"/>
    <target project="openSUSE:Factory" package="wine"/>
  </action>
  <state name="review" who="alice" when="2024-01-01T00:00:00"/>
  <review state="accepted" by_group="factory-staging"/>
  <review state="new" by_project="openSUSE:Factory:Staging:A" by_package="wine">
    <comment>pending</comment>
  </review>
  <review state="new" by_user="bob"/>
</request>"#;

    #[test]
    fn test_parse_reviews() {
        let reviews = parse_reviews("42", REQUEST).unwrap();

        assert_eq!(reviews.len(), 3);
        assert_eq!(
            reviews[0],
            Review {
                state: "accepted".into(),
                by_group: Some("factory-staging".into()),
                ..Default::default()
            }
        );
        assert_eq!(reviews[1].by_project.as_deref(), Some("openSUSE:Factory:Staging:A"));
        assert_eq!(reviews[1].by_package.as_deref(), Some("wine"));
        assert_eq!(reviews[2].by_user.as_deref(), Some("bob"));
    }

    #[test]
    fn test_parse_reviews_malformed() {
        let err = parse_reviews("42", "<request><review state=\"new\"></request>").unwrap_err();
        assert!(matches!(err, ObsError::MalformedMetadata { .. }));
    }

    #[tokio::test]
    async fn test_submit_and_reviews() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/request")
            .match_query(Matcher::UrlEncoded("cmd".into(), "create".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"<action type="submit">"#.into()),
                Matcher::Regex(r#"<source project="home:alice" package="wine"/>"#.into()),
                Matcher::Regex(r#"<target project="openSUSE:Factory" package="wine"/>"#.into()),
            ]))
            .with_status(200)
            .with_body(r#"<request id="42"/>"#)
            .create_async()
            .await;
        let fetch = server
            .mock("GET", "/request/42")
            .with_status(200)
            .with_body(REQUEST)
            .create_async()
            .await;

        let client = ObsClient::new(Client::new(), &server.url());
        let request =
            Request::submit(&client, "home:alice", "wine", "openSUSE:Factory", None, "update")
                .await
                .unwrap();

        assert_eq!(request.id(), "42");
        assert_eq!(request.reviews().await.unwrap().len(), 3);
        create.assert_async().await;
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_request_has_only_target() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/request")
            .match_query(Matcher::UrlEncoded("cmd".into(), "create".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"<action type="delete">"#.into()),
                Matcher::Regex(r#"<target project="home:alice"/>"#.into()),
            ]))
            .with_status(200)
            .with_body(r#"<request id="7"/>"#)
            .create_async()
            .await;

        let client = ObsClient::new(Client::new(), &server.url());
        let request = Request::delete(&client, "home:alice", None, "cleanup")
            .await
            .unwrap();

        assert_eq!(request.id(), "7");
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/request")
            .match_query(Matcher::UrlEncoded("cmd".into(), "create".into()))
            .with_status(200)
            .with_body(r#"<request id="42"/>"#)
            .create_async()
            .await;
        let revoke = server
            .mock("POST", "/request/42")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("cmd".into(), "changestate".into()),
                Matcher::UrlEncoded("newstate".into(), "revoked".into()),
            ]))
            .with_status(200)
            .with_body(r#"<status code="ok"/>"#)
            .expect(1)
            .create_async()
            .await;

        let client = ObsClient::new(Client::new(), &server.url());
        let mut request =
            Request::submit(&client, "home:alice", "wine", "openSUSE:Factory", None, "")
                .await
                .unwrap();

        request.revoke().await.unwrap();
        request.revoke().await.unwrap();
        revoke.assert_async().await;
    }
}
