//! Project meta documents and the link relation they declare.

use std::collections::{HashSet, VecDeque};

use log::debug;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{ObsError, Result};
use crate::obs::BuildService;
use crate::project::RemoteProject;
use crate::xml::attribute;

/// The parts of a project meta document this crate understands.
///
/// Every other element of the document is ignored here and passed through
/// untouched when a document is rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectMetadata {
    /// `name` attribute of the root element.
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// `project` attribute of every top-level `<link>`, in document order.
    pub linked_project_names: Vec<String>,
}

#[derive(Clone, Copy)]
enum TextField {
    Title,
    Description,
}

impl ProjectMetadata {
    pub fn new(linked_project_names: Vec<String>) -> Self {
        Self {
            linked_project_names,
            ..Default::default()
        }
    }

    /// Decode a meta document fetched for `project`.
    pub fn parse(project: &str, content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        let mut metadata = ProjectMetadata::default();
        let mut depth = 0usize;
        let mut saw_root = false;
        let mut capture: Option<(TextField, String)> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| ObsError::malformed(project, e))?;
            match event {
                Event::Start(e) => {
                    match depth {
                        0 => {
                            metadata.name = attribute(project, &e, "name")?;
                            saw_root = true;
                        }
                        1 => match e.name().as_ref() {
                            b"title" => capture = Some((TextField::Title, String::new())),
                            b"description" => {
                                capture = Some((TextField::Description, String::new()))
                            }
                            b"link" => {
                                metadata.linked_project_names.push(link_target(project, &e)?)
                            }
                            _ => {}
                        },
                        _ => {}
                    }
                    depth += 1;
                }
                Event::Empty(e) => match depth {
                    0 => {
                        metadata.name = attribute(project, &e, "name")?;
                        saw_root = true;
                    }
                    1 => match e.name().as_ref() {
                        b"title" => metadata.title = Some(String::new()),
                        b"description" => metadata.description = Some(String::new()),
                        b"link" => metadata.linked_project_names.push(link_target(project, &e)?),
                        _ => {}
                    },
                    _ => {}
                },
                Event::Text(e) if depth == 2 => {
                    if let Some((_, text)) = capture.as_mut() {
                        let unescaped = e.unescape().map_err(|e| ObsError::malformed(project, e))?;
                        text.push_str(&unescaped);
                    }
                }
                Event::CData(e) if depth == 2 => {
                    if let Some((_, text)) = capture.as_mut() {
                        text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == 1 {
                        match capture.take() {
                            Some((TextField::Title, text)) => metadata.title = Some(text),
                            Some((TextField::Description, text)) => {
                                metadata.description = Some(text)
                            }
                            None => {}
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root || depth != 0 {
            return Err(ObsError::malformed(project, "incomplete meta document"));
        }
        Ok(metadata)
    }

    /// Fetch the raw meta document of a project.
    #[tracing::instrument(skip(service))]
    pub async fn load<S: BuildService>(service: &S, project: &str) -> Result<String> {
        debug!("Loading meta of {}", project);
        service.fetch_project_meta(project).await
    }

    /// Store `content` as the meta document of a project.
    ///
    /// The content is not validated before writing; whatever the service
    /// rejects surfaces as its error.
    #[tracing::instrument(skip(service, content))]
    pub async fn save<S: BuildService>(service: &S, project: &str, content: &str) -> Result<()> {
        debug!("Saving meta of {}", project);
        service.save_project_meta(project, content).await
    }

    /// Resolve the projects this one links to.
    ///
    /// Linked projects are resolved breadth-first, each at most once, and
    /// returned in discovery order. With `recursive` the links of every newly
    /// resolved project are followed as well. The project named by the
    /// document itself is never part of the result, so self-links and cycles
    /// through it are harmless. A link to a project that does not exist fails
    /// the whole walk.
    #[tracing::instrument(skip(self, service), fields(project = ?self.name))]
    pub async fn linked_projects<'a, S: BuildService>(
        &self,
        service: &'a S,
        recursive: bool,
    ) -> Result<Vec<RemoteProject<'a, S>>> {
        self.resolve_links(None, service, recursive).await
    }

    /// [`linked_projects`](Self::linked_projects) of the metadata fetched for
    /// `owner`. `owner` is excluded as well, whatever the document's root
    /// name says.
    #[tracing::instrument(skip(self, service))]
    pub async fn linked_projects_of<'a, S: BuildService>(
        &self,
        owner: &str,
        service: &'a S,
        recursive: bool,
    ) -> Result<Vec<RemoteProject<'a, S>>> {
        self.resolve_links(Some(owner), service, recursive).await
    }

    async fn resolve_links<'a, S: BuildService>(
        &self,
        owner: Option<&str>,
        service: &'a S,
        recursive: bool,
    ) -> Result<Vec<RemoteProject<'a, S>>> {
        let mut to_process: VecDeque<String> =
            self.linked_project_names.iter().cloned().collect();
        let mut visited: HashSet<String> = self
            .name
            .iter()
            .cloned()
            .chain(owner.map(str::to_string))
            .collect();
        let mut result = Vec::new();

        while let Some(name) = to_process.pop_front() {
            if !visited.insert(name.clone()) {
                continue;
            }

            let project = RemoteProject::find(service, &name).await?;
            if recursive {
                if let Some(metadata) = project.metadata() {
                    to_process.extend(metadata.linked_project_names.iter().cloned());
                }
            }
            result.push(project);
        }

        debug!("Resolved {} linked project(s)", result.len());
        Ok(result)
    }
}

/// Rewrite the meta document of `parent` for a new subproject `fullname`.
///
/// The root `name` becomes `fullname`; `<title>` and `<description>` get the
/// new text where one is given. Everything else, links included, is copied
/// verbatim. A broken document is reported as malformed metadata of `parent`.
pub fn rewrite_for_subproject(
    content: &str,
    parent: &str,
    fullname: &str,
    title: Option<&str>,
    description: Option<&str>,
) -> Result<String> {
    let title = title.filter(|t| !t.is_empty());
    let description = description.filter(|d| !d.is_empty());

    let mut reader = Reader::from_str(content);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut replacing = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ObsError::malformed(parent, e))?;
        match event {
            Event::Start(e) => {
                if depth == 0 {
                    let root = renamed_root(parent, fullname, &e)?;
                    emit(&mut writer, Event::Start(root), fullname)?;
                    saw_root = true;
                } else if let Some((_, text)) = replacement(depth, &e, title, description) {
                    emit(&mut writer, Event::Start(e.borrow()), fullname)?;
                    emit(&mut writer, Event::Text(BytesText::new(text)), fullname)?;
                    replacing = true;
                } else {
                    emit(&mut writer, Event::Start(e), fullname)?;
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 {
                    let root = renamed_root(parent, fullname, &e)?;
                    emit(&mut writer, Event::Empty(root), fullname)?;
                    saw_root = true;
                } else if let Some((tag, text)) = replacement(depth, &e, title, description) {
                    emit(&mut writer, Event::Start(e.borrow()), fullname)?;
                    emit(&mut writer, Event::Text(BytesText::new(text)), fullname)?;
                    emit(&mut writer, Event::End(BytesEnd::new(tag)), fullname)?;
                } else {
                    emit(&mut writer, Event::Empty(e), fullname)?;
                }
            }
            Event::Text(_) | Event::CData(_) if replacing && depth == 2 => {}
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    replacing = false;
                }
                emit(&mut writer, Event::End(e), fullname)?;
            }
            Event::Eof => break,
            other => emit(&mut writer, other, fullname)?,
        }
    }

    if !saw_root || depth != 0 {
        return Err(ObsError::malformed(parent, "incomplete meta document"));
    }
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>, project: &str) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| ObsError::malformed(project, e))
}

fn renamed_root(parent: &str, fullname: &str, e: &BytesStart<'_>) -> Result<BytesStart<'static>> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut root = BytesStart::new(tag);
    let mut renamed = false;

    for attr in e.attributes() {
        let attr = attr.map_err(|err| ObsError::malformed(parent, err))?;
        if attr.key.as_ref() == b"name" {
            root.push_attribute(("name", fullname));
            renamed = true;
        } else {
            root.push_attribute(attr);
        }
    }
    if !renamed {
        root.push_attribute(("name", fullname));
    }
    Ok(root)
}

/// New text for a top-level `<title>` or `<description>`, if one was given.
fn replacement<'t>(
    depth: usize,
    e: &BytesStart<'_>,
    title: Option<&'t str>,
    description: Option<&'t str>,
) -> Option<(&'static str, &'t str)> {
    if depth != 1 {
        return None;
    }
    match e.name().as_ref() {
        b"title" => title.map(|t| ("title", t)),
        b"description" => description.map(|d| ("description", d)),
        _ => None,
    }
}

fn link_target(project: &str, e: &BytesStart<'_>) -> Result<String> {
    attribute(project, e, "project")?
        .ok_or_else(|| ObsError::malformed(project, "<link> without project attribute"))
}
