//! Typed construction of project meta documents.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{ObsError, Result};
use crate::metadata::ProjectMetadata;
use crate::obs::BuildService;
use crate::xml::{XmlBuilder, attribute};

/// Groups and persons holding one role in a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roles {
    pub groups: Vec<String>,
    pub users: Vec<String>,
}

impl Roles {
    fn merge(&mut self, users: &[&str], groups: &[&str]) {
        for user in users {
            if !self.users.iter().any(|u| u == user) {
                self.users.push(user.to_string());
            }
        }
        for group in groups {
            if !self.groups.iter().any(|g| g == group) {
                self.groups.push(group.to_string());
            }
        }
    }
}

/// Project meta with reviewers, maintainers, links and an optional
/// `standard` repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectMetaBuilder {
    pub name: String,
    pub title: String,
    pub description: String,
    pub reviewer: Roles,
    pub maintainer: Roles,
    pub project_links: Vec<String>,
    pub with_repo: bool,
}

impl ProjectMetaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn link(mut self, project: impl Into<String>) -> Self {
        self.project_links.push(project.into());
        self
    }

    pub fn reviewer_group(mut self, group: impl Into<String>) -> Self {
        self.reviewer.groups.push(group.into());
        self
    }

    pub fn maintainer_user(mut self, user: impl Into<String>) -> Self {
        self.maintainer.users.push(user.into());
        self
    }

    pub fn maintainer_group(mut self, group: impl Into<String>) -> Self {
        self.maintainer.groups.push(group.into());
        self
    }

    pub fn with_repo(mut self, with_repo: bool) -> Self {
        self.with_repo = with_repo;
        self
    }

    /// Add reviewers, skipping the ones already present.
    pub fn add_reviewers(&mut self, users: &[&str], groups: &[&str]) {
        self.reviewer.merge(users, groups);
    }

    pub fn build(&self) -> anyhow::Result<String> {
        let mut xml = XmlBuilder::new();
        xml.open("project", &[("name", &self.name)])?
            .text_element("title", &self.title)?
            .text_element("description", &self.description)?;

        for (role, roles) in [("reviewer", &self.reviewer), ("maintainer", &self.maintainer)] {
            for group in &roles.groups {
                xml.empty("group", &[("groupid", group), ("role", role)])?;
            }
            for user in &roles.users {
                xml.empty("person", &[("userid", user), ("role", role)])?;
            }
        }

        for link in &self.project_links {
            xml.empty("link", &[("project", link)])?;
        }

        if self.with_repo {
            xml.open("repository", &[("name", "standard")])?
                .text_element("arch", "x86_64")?
                .close("repository")?;
        }

        xml.close("project")?;
        Ok(xml.finish())
    }

    /// Read an existing meta document back. Roles other than reviewer and
    /// maintainer are dropped.
    pub fn from_document(project: &str, content: &str) -> Result<Self> {
        let metadata = ProjectMetadata::parse(project, content)?;
        let mut builder = ProjectMetaBuilder {
            name: metadata.name.unwrap_or_else(|| project.to_string()),
            title: metadata.title.unwrap_or_default(),
            description: metadata.description.unwrap_or_default(),
            project_links: metadata.linked_project_names,
            ..Default::default()
        };

        let mut reader = Reader::from_str(content);
        let mut depth = 0usize;
        loop {
            let event = reader
                .read_event()
                .map_err(|e| ObsError::malformed(project, e))?;
            let (element, opens) = match event {
                Event::Start(e) => (e, true),
                Event::Empty(e) => (e, false),
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    continue;
                }
                Event::Eof => break,
                _ => continue,
            };
            if depth == 1 {
                builder.read_child(project, &element)?;
            }
            if opens {
                depth += 1;
            }
        }

        Ok(builder)
    }

    fn read_child(&mut self, project: &str, e: &BytesStart<'_>) -> Result<()> {
        let (id_key, is_group) = match e.name().as_ref() {
            b"repository" => {
                self.with_repo = true;
                return Ok(());
            }
            b"group" => ("groupid", true),
            b"person" => ("userid", false),
            _ => return Ok(()),
        };

        let roles = match attribute(project, e, "role")?.as_deref() {
            Some("reviewer") => &mut self.reviewer,
            Some("maintainer") => &mut self.maintainer,
            _ => return Ok(()),
        };
        if let Some(id) = attribute(project, e, id_key)? {
            if is_group {
                roles.groups.push(id);
            } else {
                roles.users.push(id);
            }
        }
        Ok(())
    }

    /// Create or overwrite the project with this meta.
    #[tracing::instrument(skip(self, service), fields(project = %self.name))]
    pub async fn save<S: BuildService>(&self, service: &S) -> Result<()> {
        let document = self.build()?;
        ProjectMetadata::save(service, &self.name, &document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obs::MockBuildService;
    use mockall::predicate::eq;

    fn staging() -> ProjectMetaBuilder {
        ProjectMetaBuilder::new("openSUSE:Factory:Staging:A")
            .reviewer_group("factory-staging")
            .maintainer_group("factory-staging")
            .maintainer_user("staging-bot")
            .link("openSUSE:Factory:Rings:0-Bootstrap")
            .link("openSUSE:Factory:Rings:1-MinimalX")
            .with_repo(true)
    }

    #[test]
    fn test_build_document() {
        let document = staging().build().unwrap();

        assert!(document.starts_with(r#"<project name="openSUSE:Factory:Staging:A">"#));
        assert!(document.contains(r#"<group groupid="factory-staging" role="reviewer"/>"#));
        assert!(document.contains(r#"<group groupid="factory-staging" role="maintainer"/>"#));
        assert!(document.contains(r#"<person userid="staging-bot" role="maintainer"/>"#));
        assert!(document.contains(r#"<repository name="standard">"#));
        assert!(document.contains("<arch>x86_64</arch>"));

        let metadata = ProjectMetadata::parse("openSUSE:Factory:Staging:A", &document).unwrap();
        assert_eq!(
            metadata.linked_project_names,
            vec![
                "openSUSE:Factory:Rings:0-Bootstrap",
                "openSUSE:Factory:Rings:1-MinimalX"
            ]
        );
    }

    #[test]
    fn test_from_document_reads_back_built_meta() {
        let original = staging().title("Staging A");
        let document = original.build().unwrap();

        let parsed = ProjectMetaBuilder::from_document(&original.name, &document).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_build_without_title_or_description() {
        let document = ProjectMetaBuilder::new("P").link("L").build().unwrap();
        assert!(document.contains("<title/>"));
        assert!(document.contains("<description/>"));

        let metadata = ProjectMetadata::parse("P", &document).unwrap();
        assert_eq!(metadata.title.as_deref(), Some(""));
        assert_eq!(metadata.description.as_deref(), Some(""));
        assert_eq!(metadata.linked_project_names, vec!["L"]);
    }

    #[test]
    fn test_from_document_ignores_other_roles() {
        let document = r#"<project name="P">
  <person userid="alice" role="bugowner"/>
  <person userid="bob" role="reviewer"/>
  <repository name="images"><path project="X" repository="y"/></repository>
</project>"#;

        let parsed = ProjectMetaBuilder::from_document("P", document).unwrap();
        assert_eq!(parsed.reviewer.users, vec!["bob"]);
        assert!(parsed.maintainer.users.is_empty());
        assert!(parsed.with_repo);
    }

    #[test]
    fn test_add_reviewers_deduplicates() {
        let mut meta = ProjectMetaBuilder::new("P").reviewer_group("factory-staging");
        meta.add_reviewers(&["alice", "alice"], &["factory-staging", "review-team"]);

        assert_eq!(meta.reviewer.users, vec!["alice"]);
        assert_eq!(meta.reviewer.groups, vec!["factory-staging", "review-team"]);
    }

    #[tokio::test]
    async fn test_save() {
        let meta = ProjectMetaBuilder::new("home:alice").link("openSUSE:Factory");
        let expected = meta.build().unwrap();

        let mut service = MockBuildService::new();
        service
            .expect_save_project_meta()
            .with(eq("home:alice"), eq(expected))
            .times(1)
            .returning(|_, _| Ok(()));

        meta.save(&service).await.unwrap();
    }
}
