//! # Account Properties
//!
//! Free-form key/value properties stored on each managed account. How they
//! are produced is up to a [`PropertiesApplier`] handed to the reconciler.
//!
//! `TemplateProperties` renders one template per key, substituting a small
//! set of placeholders:
//!
//! | Placeholder        | Value                                   |
//! |--------------------|-----------------------------------------|
//! | `{login}`          | the login                               |
//! | `{primary_group}`  | first group of the record               |
//! | `{groups}`         | every group, comma separated            |
//! | `{krb_principals}` | Kerberos principals, `\|` separated     |
//! | `{cert_dns}`       | certificate DNs, `\|` separated         |
//!
//! Only keys whose rendered value differs from what the account already has
//! are sent, in a single merge update.

use std::collections::BTreeMap;

use log::info;

use crate::credentials::SEPARATOR;
use crate::error::Result;
use crate::feed::SourceUser;
use crate::platform::{Platform, TargetUser};

/// Produces and stores the properties of one account.
pub trait PropertiesApplier {
    /// Returns the number of mutating calls issued.
    fn apply(
        &self,
        platform: &dyn Platform,
        user: &mut TargetUser,
        source: &SourceUser,
    ) -> Result<usize>;
}

/// Leaves account properties alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProperties;

impl PropertiesApplier for NoProperties {
    fn apply(&self, _: &dyn Platform, _: &mut TargetUser, _: &SourceUser) -> Result<usize> {
        Ok(0)
    }
}

/// Renders configured templates into account properties.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TemplateProperties {
    templates: BTreeMap<String, String>,
}

impl TemplateProperties {
    pub fn new(templates: BTreeMap<String, String>) -> Self {
        Self { templates }
    }

    pub fn render(&self, source: &SourceUser) -> BTreeMap<String, String> {
        self.templates
            .iter()
            .map(|(key, template)| (key.clone(), render_template(template, source)))
            .collect()
    }
}

impl PropertiesApplier for TemplateProperties {
    fn apply(
        &self,
        platform: &dyn Platform,
        user: &mut TargetUser,
        source: &SourceUser,
    ) -> Result<usize> {
        let changed: BTreeMap<String, String> = self
            .render(source)
            .into_iter()
            .filter(|(key, value)| user.properties.get(key) != Some(value))
            .collect();
        if changed.is_empty() {
            return Ok(0);
        }

        info!(
            "Updating properties {:?} of {:?}",
            changed.keys().collect::<Vec<_>>(),
            user.name
        );
        platform.update_properties(user.id, &changed)?;
        user.properties.extend(changed);
        Ok(1)
    }
}

fn render_template(template: &str, source: &SourceUser) -> String {
    template
        .replace("{login}", source.login())
        .replace("{primary_group}", source.primary_group().unwrap_or_default())
        .replace("{groups}", &source.groups().join(","))
        .replace("{krb_principals}", &source.krb_principals().join(SEPARATOR))
        .replace("{cert_dns}", &source.cert_dns().join(SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::{Call, MockPlatform};
    use crate::platform::TargetGroup;

    fn alice() -> SourceUser {
        SourceUser::new(
            "alice",
            vec!["labA".to_string(), "labB".to_string()],
            vec!["a@R".to_string()],
            vec!["CN=alice".to_string(), "CN=alice2".to_string()],
        )
    }

    fn templates() -> TemplateProperties {
        TemplateProperties::new(BTreeMap::from([
            ("LOGIN".to_string(), "{login}".to_string()),
            ("HOME_GROUP".to_string(), "{primary_group}".to_string()),
            ("INFO".to_string(), "{groups} / {cert_dns}".to_string()),
        ]))
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let rendered = templates().render(&alice());
        assert_eq!(rendered["LOGIN"], "alice");
        assert_eq!(rendered["HOME_GROUP"], "labA");
        assert_eq!(rendered["INFO"], "labA,labB / CN=alice|CN=alice2");
    }

    #[test]
    fn test_apply_sends_only_changed_keys() {
        let platform = MockPlatform::new(
            vec![TargetGroup::new(100, "labA")],
            vec![TargetUser::new(7, "alice", 100)],
        );
        let mut user = TargetUser::new(7, "alice", 100)
            .with_property("LOGIN", "alice")
            .with_property("HOME_GROUP", "labB");

        let calls = templates().apply(&platform, &mut user, &alice()).unwrap();

        assert_eq!(calls, 1);
        assert_eq!(
            platform.calls(),
            vec![Call::UpdateProperties(
                7,
                vec!["HOME_GROUP".to_string(), "INFO".to_string()]
            )]
        );
        assert_eq!(user.properties["HOME_GROUP"], "labA");
    }

    #[test]
    fn test_apply_in_sync_issues_no_call() {
        let platform = MockPlatform::new(vec![], vec![]);
        let mut user = TargetUser::new(7, "alice", 100);
        user.properties = templates().render(&alice());

        assert_eq!(templates().apply(&platform, &mut user, &alice()).unwrap(), 0);
        assert_eq!(NoProperties.apply(&platform, &mut user, &alice()).unwrap(), 0);
        assert!(platform.calls().is_empty());
    }
}
