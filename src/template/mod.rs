//! # Templates
//!
//! A template is an XML document describing the desired content of one
//! organization: packages, DSOs, XML store objects, roles, users and service
//! groups. The same document drives four operations:
//!
//! - [`Template::export`] captures a live organization.
//! - [`Template::apply`] creates or updates until the organization matches.
//! - [`Template::check`] reports differences without changing anything.
//! - [`Template::purge`] removes what the template names.
//!
//! Text and attribute values may contain `${name}` placeholders (see
//! [`substitute`]). They are resolved before any element is processed, with
//! `org`, `root`, `system` and `user` always bound.

use std::path::Path;

use crate::error::{Error, Result};
use crate::object::DirectoryObject;
use crate::xml::XmlNode;

pub mod export;
pub mod model;
pub mod objective;
mod reconcile;
pub mod substitute;

pub use export::ExportOptions;
pub use model::{Element, Reference};
pub use objective::{Mode, Objective, Status};
pub use substitute::Variables;

use reconcile::Reconciler;

const ROOT_ELEMENT: &str = "template";

/// A parsed template document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    document: XmlNode,
}

impl Template {
    pub fn from_elements(elements: &[Element]) -> Self {
        let mut document = XmlNode::new(ROOT_ELEMENT);
        for element in elements {
            document.push(element.to_xml());
        }
        Self { document }
    }

    pub(crate) fn from_document(document: XmlNode) -> Self {
        Self { document }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let document = XmlNode::parse(text)?;
        if document.local_name() != ROOT_ELEMENT {
            return Err(Error::Template {
                message: format!(
                    "expected <{}> as the root element, found <{}>",
                    ROOT_ELEMENT,
                    document.local_name()
                ),
                variable: None,
            });
        }
        Ok(Self { document })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        log::debug!("Reading template {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text = self.to_xml_string()?;
        text.push('\n');
        std::fs::write(path, text)?;
        log::info!("Template written to {}", path.display());
        Ok(())
    }

    /// The unresolved document, placeholders included.
    pub fn document(&self) -> &XmlNode {
        &self.document
    }

    pub fn to_xml_string(&self) -> Result<String> {
        self.document.to_pretty_string()
    }

    /// Capture `organization` as a template.
    pub fn export(organization: &DirectoryObject, options: &ExportOptions) -> Result<Self> {
        export::export(organization, options)
    }

    /// The variables bound for `organization`, overlaid with `extra`.
    pub fn variables_for(organization: &DirectoryObject, extra: &Variables) -> Result<Variables> {
        let system = organization.system()?;
        let mut variables = Variables::with_defaults(
            organization.name(),
            &system.root().to_string(),
            system.name(),
            system.user(),
        );
        variables.extend(extra);
        Ok(variables)
    }

    /// The document with every placeholder replaced.
    pub fn resolve(&self, organization: &DirectoryObject, variables: &Variables) -> Result<XmlNode> {
        let variables = Self::variables_for(organization, variables)?;
        substitute::substitute_xml(&self.document, &variables)
    }

    /// The typed elements of the resolved document.
    pub fn elements(
        &self,
        organization: &DirectoryObject,
        variables: &Variables,
    ) -> Result<Vec<Element>> {
        self.resolve(organization, variables)?
            .elements()
            .map(Element::from_xml)
            .collect()
    }

    pub fn apply(&self, organization: &DirectoryObject, variables: &Variables) -> Result<Objective> {
        self.run(organization, variables, Mode::Configure)
    }

    pub fn check(&self, organization: &DirectoryObject, variables: &Variables) -> Result<Objective> {
        self.run(organization, variables, Mode::Check)
    }

    pub fn purge(&self, organization: &DirectoryObject, variables: &Variables) -> Result<Objective> {
        self.run(organization, variables, Mode::Purge)
    }

    fn run(
        &self,
        organization: &DirectoryObject,
        variables: &Variables,
        mode: Mode,
    ) -> Result<Objective> {
        let document = self.resolve(organization, variables)?;
        Ok(Reconciler::new(organization, mode)?.run(&document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::model::PackageSpec;
    use tempfile::TempDir;

    #[test]
    fn test_parse_rejects_other_roots() {
        assert!(Template::parse("<template><package name=\"A\"/></template>").is_ok());
        assert!(matches!(
            Template::parse("<config/>"),
            Err(Error::Template { .. })
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let template = Template::from_elements(&[Element::Package(PackageSpec {
            name: "Orders".to_string(),
        })]);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("acme.xml");
        template.save(&path).unwrap();
        assert_eq!(Template::from_file(&path).unwrap(), template);
    }
}
