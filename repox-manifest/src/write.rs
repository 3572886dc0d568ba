//! Hand-rolled XML serialization.
//!
//! `quick-xml`'s serde `Serializer` has no notion of "omit this attribute
//! when it equals its default", so the writer side of the round-trip is
//! built directly on [`quick_xml::writer::Writer`] instead of `#[derive]`.
//! This is what gives us the three properties spec.md §6/§8 require:
//! empty containers stripped, short empty elements (`<x/>`), and default
//! attributes elided.

use std::io::Cursor;

use quick_xml::events::{BytesStart, Event};
use quick_xml::writer::Writer;

use crate::hook::Hook;
use crate::import::{Import, LocalImport};
use crate::local_config::LocalConfig;
use crate::manifest::Manifest;
use crate::package::Package;
use crate::project::{Project, DEFAULT_REMOTE_BRANCH, DEFAULT_REVISION};
use crate::workspace_config::WorkspaceConfig;

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn new_writer() -> XmlWriter {
    Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2)
}

fn finish(writer: XmlWriter) -> String {
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).expect("manifest writer only emits UTF-8 text")
}

impl Manifest {
    /// Serializes back to a `<manifest>` document. Empty containers are
    /// omitted, elements with no children are written short (`<x/>`), and
    /// `remote-branch="master"` / `revision="HEAD"` are elided.
    pub fn to_xml_string(&self) -> String {
        let mut writer = new_writer();
        let mut start = BytesStart::new("manifest");
        if let Some(v) = &self.version {
            start.push_attribute(("version", v.as_str()));
        }
        writer.write_event(Event::Start(start.clone())).expect("in-memory write");

        write_imports(&mut writer, self.imports(), self.local_imports());
        write_project_list(&mut writer, "projects", "project", self.projects());
        write_project_list(&mut writer, "overrides", "project", self.overrides());
        write_hooks(&mut writer, self.hooks());
        write_packages(&mut writer, self.packages());

        writer
            .write_event(Event::End(start.to_end()))
            .expect("in-memory write");
        finish(writer)
    }
}

/// Serializes one project on its own, used for the `metadata.v2` sidecar
/// (spec.md §6) and for `jiri snapshot` output rows.
pub fn project_to_xml_string(project: &Project) -> String {
    let mut writer = new_writer();
    write_project(&mut writer, project);
    finish(writer)
}

impl LocalConfig {
    /// Serializes to `<config><ignore>..</ignore>...</config>` (spec.md
    /// §6). All three children are always written, since this file has no
    /// documented default-elision rule of its own.
    pub fn to_xml_string(&self) -> String {
        let mut writer = new_writer();
        let start = BytesStart::new("config");
        writer.write_event(Event::Start(start.clone())).expect("in-memory write");
        write_bool_element(&mut writer, "ignore", self.ignore);
        write_bool_element(&mut writer, "no-update", self.no_update);
        write_bool_element(&mut writer, "no-rebase", self.no_rebase);
        writer.write_event(Event::End(start.to_end())).expect("in-memory write");
        finish(writer)
    }
}

impl WorkspaceConfig {
    /// Serializes to `.jiri_root/config`'s `<config>` shape (spec.md §6
    /// "Workspace metadata directory"). Unset optional fields are omitted
    /// entirely rather than written empty; booleans are always written,
    /// matching `LocalConfig`'s own convention.
    pub fn to_xml_string(&self) -> String {
        let mut writer = new_writer();
        let start = BytesStart::new("config");
        writer.write_event(Event::Start(start.clone())).expect("in-memory write");
        if let Some(v) = &self.cache_path {
            write_text_element(&mut writer, "cache-path", v);
        }
        write_bool_element(&mut writer, "shared-cache", self.shared_cache);
        write_bool_element(&mut writer, "partial-clone", self.partial_clone);
        if let Some(v) = &self.partial_clone_filter {
            write_text_element(&mut writer, "partial-clone-filter", v);
        }
        if let Some(v) = &self.lockfile_name {
            write_text_element(&mut writer, "lockfile-name", v);
        }
        write_bool_element(&mut writer, "enforce-lockfile", self.enforce_lockfile);
        write_bool_element(&mut writer, "analytics-opt-in", self.analytics_opt_in);
        let attributes = self.attributes();
        if !attributes.is_empty() {
            let attrs_start = BytesStart::new("attributes");
            writer.write_event(Event::Start(attrs_start.clone())).expect("in-memory write");
            for attribute in attributes {
                write_text_element(&mut writer, "attribute", attribute);
            }
            writer.write_event(Event::End(attrs_start.to_end())).expect("in-memory write");
        }
        writer.write_event(Event::End(start.to_end())).expect("in-memory write");
        finish(writer)
    }
}

fn write_text_element(writer: &mut XmlWriter, name: &str, value: &str) {
    let start = BytesStart::new(name);
    writer.write_event(Event::Start(start.clone())).expect("in-memory write");
    writer
        .write_event(Event::Text(quick_xml::events::BytesText::new(value)))
        .expect("in-memory write");
    writer.write_event(Event::End(start.to_end())).expect("in-memory write");
}

fn write_bool_element(writer: &mut XmlWriter, name: &str, value: bool) {
    let start = BytesStart::new(name);
    writer.write_event(Event::Start(start.clone())).expect("in-memory write");
    writer
        .write_event(Event::Text(quick_xml::events::BytesText::new(if value {
            "true"
        } else {
            "false"
        })))
        .expect("in-memory write");
    writer.write_event(Event::End(start.to_end())).expect("in-memory write");
}

fn write_imports(writer: &mut XmlWriter, imports: &[Import], local_imports: &[LocalImport]) {
    if imports.is_empty() && local_imports.is_empty() {
        return;
    }
    let start = BytesStart::new("imports");
    writer.write_event(Event::Start(start.clone())).expect("in-memory write");
    for import in imports {
        let mut el = BytesStart::new("import");
        el.push_attribute(("name", import.name.as_str()));
        el.push_attribute(("remote", import.remote.as_str()));
        if let Some(m) = &import.manifest {
            el.push_attribute(("manifest", m.as_str()));
        }
        push_if_non_default(&mut el, "remote-branch", &import.remote_branch, DEFAULT_REMOTE_BRANCH);
        push_if_non_default(&mut el, "revision", &import.revision, DEFAULT_REVISION);
        if let Some(root) = &import.root {
            el.push_attribute(("root", root.as_str()));
        }
        writer.write_event(Event::Empty(el)).expect("in-memory write");
    }
    for local in local_imports {
        let mut el = BytesStart::new("localimport");
        el.push_attribute(("file", local.file.as_str()));
        writer.write_event(Event::Empty(el)).expect("in-memory write");
    }
    writer.write_event(Event::End(start.to_end())).expect("in-memory write");
}

fn write_project_list(writer: &mut XmlWriter, container: &str, element: &str, projects: &[Project]) {
    if projects.is_empty() {
        return;
    }
    let start = BytesStart::new(container);
    writer.write_event(Event::Start(start.clone())).expect("in-memory write");
    for project in projects {
        write_project_named(writer, element, project);
    }
    writer.write_event(Event::End(start.to_end())).expect("in-memory write");
}

fn write_project(writer: &mut XmlWriter, project: &Project) {
    write_project_named(writer, "project", project);
}

fn write_project_named(writer: &mut XmlWriter, element: &str, project: &Project) {
    let mut el = BytesStart::new(element);
    el.push_attribute(("name", project.name.as_str()));
    if let Some(path) = &project.path {
        if path != &project.name {
            el.push_attribute(("path", path.as_str()));
        }
    }
    el.push_attribute(("remote", project.remote.as_str()));
    push_if_non_default(&mut el, "remote-branch", &project.remote_branch, DEFAULT_REMOTE_BRANCH);
    push_if_non_default(&mut el, "revision", &project.revision, DEFAULT_REVISION);
    if let Some(v) = &project.gerrit_host {
        el.push_attribute(("gerrit-host", v.as_str()));
    }
    if let Some(v) = &project.git_hooks {
        el.push_attribute(("git-hooks", v.as_str()));
    }
    if let Some(depth) = project.history_depth {
        if depth != 0 {
            el.push_attribute(("history-depth", depth.to_string().as_str()));
        }
    }
    writer.write_event(Event::Empty(el)).expect("in-memory write");
}

fn write_hooks(writer: &mut XmlWriter, hooks: &[Hook]) {
    if hooks.is_empty() {
        return;
    }
    let start = BytesStart::new("hooks");
    writer.write_event(Event::Start(start.clone())).expect("in-memory write");
    for hook in hooks {
        let mut el = BytesStart::new("hook");
        el.push_attribute(("name", hook.name.as_str()));
        el.push_attribute(("action", hook.action.as_str()));
        el.push_attribute(("project", hook.project_name.as_str()));
        writer.write_event(Event::Empty(el)).expect("in-memory write");
    }
    writer.write_event(Event::End(start.to_end())).expect("in-memory write");
}

fn write_packages(writer: &mut XmlWriter, packages: &[Package]) {
    if packages.is_empty() {
        return;
    }
    let start = BytesStart::new("packages");
    writer.write_event(Event::Start(start.clone())).expect("in-memory write");
    for package in packages {
        let mut el = BytesStart::new("package");
        el.push_attribute(("name", package.name.as_str()));
        el.push_attribute(("version", package.version.as_str()));
        if let Some(p) = &package.platforms {
            el.push_attribute(("platforms", p.as_str()));
        }
        if let Some(i) = package.internal {
            el.push_attribute(("internal", i.to_string().as_str()));
        }
        writer.write_event(Event::Empty(el)).expect("in-memory write");
    }
    writer.write_event(Event::End(start.to_end())).expect("in-memory write");
}

fn push_if_non_default<'a>(el: &mut BytesStart<'a>, attr: &'a str, value: &'a Option<String>, default: &str) {
    if let Some(v) = value {
        if v != default {
            el.push_attribute((attr, v.as_str()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elides_default_attributes() {
        let xml = r#"<manifest><projects>
            <project name="foo" remote="https://example.com/foo" remote-branch="master" revision="HEAD"/>
        </projects></manifest>"#;
        let manifest = Manifest::parse(xml).unwrap();
        let out = manifest.to_xml_string();
        assert!(!out.contains("remote-branch"));
        assert!(!out.contains("revision"));
        assert!(out.contains(r#"name="foo""#));
    }

    #[test]
    fn strips_empty_containers() {
        let manifest = Manifest::default();
        let out = manifest.to_xml_string();
        assert!(!out.contains("<projects>"));
        assert!(!out.contains("<imports>"));
        assert!(out.contains("<manifest"));
    }

    #[test]
    fn round_trips_non_default_values() {
        let xml = r#"<manifest><projects>
            <project name="foo" path="vendor/foo" remote="https://example.com/foo" remote-branch="release" revision="deadbeef"/>
        </projects></manifest>"#;
        let manifest = Manifest::parse(xml).unwrap();
        let out = manifest.to_xml_string();
        let reparsed = Manifest::parse(&out).unwrap();
        assert_eq!(manifest.projects(), reparsed.projects());
    }

    #[test]
    fn local_config_round_trips() {
        let cfg = LocalConfig {
            ignore: false,
            no_update: true,
            no_rebase: false,
        };
        let xml = cfg.to_xml_string();
        let reparsed: LocalConfig = quick_xml::de::from_str(&xml).unwrap();
        assert_eq!(cfg, reparsed);
    }

    #[test]
    fn workspace_config_round_trips_with_attributes() {
        let mut cfg = WorkspaceConfig::default();
        cfg.cache_path = Some("/var/cache/repox".to_string());
        cfg.shared_cache = true;
        cfg.attributes = Some(crate::workspace_config::Attributes {
            attribute: vec!["linux".to_string(), "internal".to_string()],
        });
        let xml = cfg.to_xml_string();
        let reparsed = WorkspaceConfig::parse(&xml).unwrap();
        assert_eq!(reparsed.cache_path.as_deref(), Some("/var/cache/repox"));
        assert!(reparsed.shared_cache);
        assert_eq!(reparsed.attributes(), ["linux", "internal"]);
        assert_eq!(reparsed.lockfile_name.as_deref(), Some("jiri.lock"));
    }

    #[test]
    fn workspace_config_omits_unset_optional_fields() {
        let cfg = WorkspaceConfig { lockfile_name: None, ..WorkspaceConfig::default() };
        let xml = cfg.to_xml_string();
        assert!(!xml.contains("cache-path"));
        assert!(!xml.contains("lockfile-name"));
        assert!(!xml.contains("<attributes>"));
    }
}
