use serde::Serialize;

/// A package as listed in one project on the build service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemotePackage {
    pub name: String,
    pub project: String,
}

impl RemotePackage {
    pub fn new(name: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
        }
    }

    /// Name of the package without a maintenance incident suffix.
    ///
    /// Maintenance updates branch packages as `<name>.<incident>`, e.g.
    /// `autoyast2.10233`; both names refer to the same released package.
    pub fn release_name(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((base, incident))
                if !base.is_empty()
                    && !incident.is_empty()
                    && incident.bytes().all(|b| b.is_ascii_digit()) =>
            {
                base
            }
            _ => &self.name,
        }
    }
}

impl std::fmt::Display for RemotePackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project, self.name)
    }
}
