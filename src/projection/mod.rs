//! Derivation of JSON tasks from the render tasks of the upstream graph.
//!
//! Every qualifying upstream task gets a twin whose target mirrors the
//! upstream target inside the JSON folder. The twin depends on nothing but the
//! upstream target file, so the host executor reruns it exactly when the page
//! itself changes.

mod shape;
mod upstream;

use std::fmt::Debug;
use std::sync::Arc;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde_json::{Map, Value};
use tracing::debug;

pub use self::shape::{
    Fallback, GalleryDocument, ListDocument, PassThroughDocument, Shape, ShapeTable, Shaped,
};
pub use self::upstream::{
    ContextProvider, Folder, Gallery, Photo, RenderContext, Size, TaskGenerator, UpstreamNode,
    UpstreamTask,
};
use crate::config::Settings;
use crate::context::GlobalContext;
use crate::core::{Hash32, JSON_SUFFIX};
use crate::document::DocumentBuilder;
use crate::error::{ProjectionError, TaskError};
use crate::output::write_json;

/// File name of the global context document inside the JSON folder.
pub const GLOBAL_CONTEXT_FILE: &str = "global_context.json";

/// Extension key holding the client template manifest.
pub const CLIENT_TEMPLATES_KEY: &str = "client_templates";

/// The producer of a projected task, run when the executor finds it stale.
pub type Action = Arc<dyn Fn() -> Result<(), TaskError> + Send + Sync>;

/// A projected task.
#[derive(Clone)]
pub struct TaskNode {
    pub name: String,
    /// Name of the component that produced the task.
    pub basename: String,
    pub target: Utf8PathBuf,
    pub file_deps: Vec<Utf8PathBuf>,
    pub fingerprint: Hash32,
    pub action: Action,
}

impl TaskNode {
    pub fn run(&self) -> Result<(), TaskError> {
        (self.action)()
    }
}

impl Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("name", &self.name)
            .field("basename", &self.basename)
            .field("target", &self.target)
            .field("file_deps", &self.file_deps)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

const GLOB_OPTS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Selects the upstream tasks that get projected.
#[derive(Clone)]
pub struct Filter(Arc<dyn Fn(&UpstreamTask) -> bool + Send + Sync>);

impl Filter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&UpstreamTask) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Tasks rendered by the action `name`.
    pub fn action(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(move |task| task.action == name)
    }

    /// Tasks whose target matches the glob `pattern`.
    pub fn target_glob(pattern: &str) -> Result<Self, glob::PatternError> {
        let pattern = glob::Pattern::new(pattern)?;
        Ok(Self::new(move |task| {
            pattern.matches_path_with(task.target.as_std_path(), GLOB_OPTS)
        }))
    }

    pub fn matches(&self, task: &UpstreamTask) -> bool {
        (self.0)(task)
    }
}

/// Maps an upstream target to the target of its JSON twin, e.g.
/// `output/posts/a.html` to `output/spa/posts/a.html.json`.
pub fn derive_target(settings: &Settings, target: &Utf8Path) -> Result<Utf8PathBuf, ProjectionError> {
    let outside = || ProjectionError::OutsideOutput {
        target: target.to_owned(),
        root: settings.output_folder.clone(),
    };

    let rel = target
        .strip_prefix(&settings.output_folder)
        .map_err(|_| outside())?;

    let escapes = rel
        .components()
        .any(|c| !matches!(c, Utf8Component::Normal(_) | Utf8Component::CurDir));

    if escapes {
        return Err(outside());
    }

    let file_name = rel.file_name().ok_or_else(outside)?;

    let mut derived = settings.output_folder.join(&settings.json_folder).join(rel);
    derived.set_file_name(format!("{file_name}{JSON_SUFFIX}"));

    Ok(derived)
}

/// Projects upstream generators into JSON tasks.
pub struct Projector {
    basename: String,
    builder: DocumentBuilder,
    shapes: Arc<ShapeTable>,
    settings_hash: Hash32,
}

impl Projector {
    pub fn new(basename: impl Into<String>, builder: DocumentBuilder) -> Result<Self, ProjectionError> {
        let settings_hash = Hash32::hash_json(&builder.site().settings)?;

        Ok(Self {
            basename: basename.into(),
            builder,
            shapes: Arc::new(ShapeTable::default()),
            settings_hash,
        })
    }

    pub fn with_shapes(mut self, shapes: ShapeTable) -> Self {
        self.shapes = Arc::new(shapes);
        self
    }

    fn settings(&self) -> &Settings {
        &self.builder.site().settings
    }

    /// Derives one task per qualifying task of `generator`.
    ///
    /// The first node of the upstream sequence has to be a group, an upstream
    /// producing nothing at all projects to nothing.
    pub fn project<'a>(
        &'a self,
        generator: &'a dyn TaskGenerator,
        filter: Option<&'a Filter>,
    ) -> impl Iterator<Item = Result<TaskNode, ProjectionError>> + 'a {
        let mut nodes = generator.gen_tasks();

        let head = match nodes.next() {
            Some(UpstreamNode::Task(_)) => {
                Some(Err(ProjectionError::MissingGroup(generator.name().to_string())))
            }
            _ => None,
        };

        let rest = head.is_none().then_some(nodes);

        head.into_iter()
            .chain(rest.into_iter().flatten().filter_map(move |node| match node {
                UpstreamNode::Group { name } => {
                    debug!(group = %name, "skipping nested group");
                    None
                }
                UpstreamNode::Task(task) => {
                    if filter.is_some_and(|filter| !filter.matches(&task)) {
                        return None;
                    }
                    self.project_task(task).transpose()
                }
            }))
    }

    fn project_task(&self, task: UpstreamTask) -> Result<Option<TaskNode>, ProjectionError> {
        let Some(kind) = self.shapes.shape_of(&task.template) else {
            debug!(task = %task.name, template = %task.template, "no shape for template, skipping");
            return Ok(None);
        };

        let settings = self.settings();
        let target = derive_target(settings, &task.target)?;
        let id = document_id(settings, &target);
        let fingerprint = Hash32::combine(&[task.fingerprint, self.settings_hash]);

        let action: Action = {
            let builder = self.builder.clone();
            let provider = task.context.clone();
            let name = task.name.clone();
            let target = target.clone();

            Arc::new(move || -> Result<(), TaskError> {
                let context = provider
                    .context()
                    .map_err(|source| ProjectionError::Context {
                        task: name.clone(),
                        source,
                    })?;

                let shaped = shape::shape(kind, &id, context, &builder, &name)?;
                write_json(&target, &shaped)?;
                Ok(())
            })
        };

        Ok(Some(TaskNode {
            name: format!("{}:{}", self.basename, task.name),
            basename: self.basename.clone(),
            target,
            file_deps: vec![task.target],
            fingerprint,
            action,
        }))
    }

    /// Task writing the global context document.
    ///
    /// Its file dependencies are the files of every template listed in the
    /// client template manifest of `extensions`.
    pub fn global_context_task(&self, extensions: Map<String, Value>) -> Result<TaskNode, ProjectionError> {
        let site = self.builder.site();
        let settings = &site.settings;

        let mut file_deps: Vec<Utf8PathBuf> = match (&site.templates, extensions.get(CLIENT_TEMPLATES_KEY)) {
            (Some(templates), Some(Value::Object(manifest))) => manifest
                .keys()
                .flat_map(|name| templates.template_deps(name))
                .collect(),
            _ => Vec::new(),
        };
        file_deps.sort();
        file_deps.dedup();

        let context = Arc::new(GlobalContext::build(site, extensions));
        let fingerprint = Hash32::combine(&[context.fingerprint()?, self.settings_hash]);

        let target = settings
            .output_folder
            .join(&settings.json_folder)
            .join(GLOBAL_CONTEXT_FILE);

        let action: Action = {
            let target = target.clone();
            Arc::new(move || -> Result<(), TaskError> {
                Ok(write_json(&target, context.as_ref())?)
            })
        };

        Ok(TaskNode {
            name: format!("{}:{}", self.basename, GLOBAL_CONTEXT_FILE),
            basename: self.basename.clone(),
            target,
            file_deps,
            fingerprint,
            action,
        })
    }
}

/// Identifier of a list or gallery document, its path from the output root.
fn document_id(settings: &Settings, target: &Utf8Path) -> String {
    let rel = target
        .strip_prefix(&settings.output_folder)
        .unwrap_or(target);
    format!("/{rel}")
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use chrono::DateTime;
    use serde_json::json;

    use super::*;
    use crate::document::DocumentCache;
    use crate::site::{Localized, PatternResolver, Post, Site, TemplateDeps};

    struct Upstream {
        name: &'static str,
        nodes: Mutex<Option<Vec<UpstreamNode>>>,
    }

    impl Upstream {
        fn new(name: &'static str, nodes: Vec<UpstreamNode>) -> Self {
            Self {
                name,
                nodes: Mutex::new(Some(nodes)),
            }
        }
    }

    impl TaskGenerator for Upstream {
        fn name(&self) -> &str {
            self.name
        }

        fn gen_tasks(&self) -> Box<dyn Iterator<Item = UpstreamNode> + '_> {
            let nodes = self.nodes.lock().unwrap().take().unwrap_or_default();
            Box::new(nodes.into_iter())
        }
    }

    struct Templates;

    impl TemplateDeps for Templates {
        fn template_deps(&self, name: &str) -> Vec<Utf8PathBuf> {
            vec![
                Utf8PathBuf::from(format!("templates/{name}")),
                Utf8PathBuf::from("templates/base.tmpl"),
            ]
        }
    }

    fn post() -> Arc<Post> {
        let date = DateTime::parse_from_rfc3339("2024-05-01T12:00:00+00:00").unwrap();
        Arc::new(
            Post::new("posts/hello.md", "post.tmpl", date).with_locale(
                "en",
                Localized {
                    title: "Hello".into(),
                    permalink: "/posts/hello.html".into(),
                    text: "<p>hi</p>".into(),
                    ..Default::default()
                },
            ),
        )
    }

    fn settings(output: &Utf8Path) -> Settings {
        Settings {
            output_folder: output.to_owned(),
            ..Settings::default()
        }
    }

    fn projector(settings: Settings) -> Projector {
        let site = Site::new(settings, Arc::new(PatternResolver::new("en")))
            .with_templates(Arc::new(Templates));
        let builder = DocumentBuilder::new(Arc::new(site), Arc::new(DocumentCache::new()));
        Projector::new("render_spa", builder).unwrap()
    }

    fn group() -> UpstreamNode {
        UpstreamNode::Group {
            name: "render_posts".into(),
        }
    }

    fn task(target: &str, template: &str, action: &str, context: RenderContext) -> UpstreamNode {
        UpstreamNode::Task(UpstreamTask {
            name: target.into(),
            target: target.into(),
            file_deps: vec!["posts/hello.md".into()],
            fingerprint: Hash32::hash(target),
            template: template.into(),
            action: action.into(),
            context: Arc::new(move || -> anyhow::Result<RenderContext> { Ok(context.clone()) }),
        })
    }

    fn entity_task(target: &str) -> UpstreamNode {
        task(
            target,
            "post.tmpl",
            "render_page",
            RenderContext::new("en").with_post(post()),
        )
    }

    #[test]
    fn test_derive_target() {
        let settings = settings(Utf8Path::new("output"));

        assert_eq!(
            derive_target(&settings, Utf8Path::new("output/posts/a.html")).unwrap(),
            Utf8Path::new("output/spa/posts/a.html.json")
        );
        assert_eq!(
            derive_target(&settings, Utf8Path::new("output/index.html")).unwrap(),
            Utf8Path::new("output/spa/index.html.json")
        );

        let nested = Settings {
            json_folder: "data/json".into(),
            ..settings.clone()
        };
        assert_eq!(
            derive_target(&nested, Utf8Path::new("output/pl/posts/a.html")).unwrap(),
            Utf8Path::new("output/data/json/pl/posts/a.html.json")
        );
    }

    #[test]
    fn test_derive_target_outside_output() {
        let settings = settings(Utf8Path::new("output"));

        for target in ["elsewhere/a.html", "output2/a.html", "output/../a.html", "output"] {
            let err = derive_target(&settings, Utf8Path::new(target)).unwrap_err();
            assert!(matches!(err, ProjectionError::OutsideOutput { .. }), "{target}");
        }
    }

    #[test]
    fn test_project_skips_group_and_keeps_dependency() {
        let projector = projector(settings(Utf8Path::new("output")));
        let upstream = Upstream::new(
            "render_posts",
            vec![group(), entity_task("output/posts/hello.html")],
        );

        let nodes: Vec<TaskNode> = projector
            .project(&upstream, None)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].target, Utf8Path::new("output/spa/posts/hello.html.json"));
        assert_eq!(nodes[0].file_deps, vec![Utf8PathBuf::from("output/posts/hello.html")]);
        assert_eq!(nodes[0].basename, "render_spa");
        assert_eq!(nodes[0].name, "render_spa:output/posts/hello.html");
    }

    #[test]
    fn test_project_fingerprint_combines_settings() {
        let upstream = || Upstream::new("render_posts", vec![group(), entity_task("output/posts/hello.html")]);

        let one = projector(settings(Utf8Path::new("output")));
        let two = projector(Settings {
            index_teasers: true,
            ..settings(Utf8Path::new("output"))
        });

        let a = one.project(&upstream(), None).next().unwrap().unwrap();
        let b = one.project(&upstream(), None).next().unwrap().unwrap();
        let c = two.project(&upstream(), None).next().unwrap().unwrap();

        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_ne!(a.fingerprint, Hash32::hash("output/posts/hello.html"));
    }

    #[test]
    fn test_project_empty_and_missing_group() {
        let projector = projector(settings(Utf8Path::new("output")));

        let empty = Upstream::new("render_posts", vec![]);
        assert_eq!(projector.project(&empty, None).count(), 0);

        let only_group = Upstream::new("render_posts", vec![group()]);
        assert_eq!(projector.project(&only_group, None).count(), 0);

        let headless = Upstream::new("render_posts", vec![entity_task("output/posts/hello.html")]);
        let results: Vec<_> = projector.project(&headless, None).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(ProjectionError::MissingGroup(_))));
    }

    #[test]
    fn test_filter_picks_gallery_index() {
        let projector = projector(settings(Utf8Path::new("output")));
        let gallery = RenderContext::new("en").with_gallery(Gallery::default());

        let upstream = Upstream::new(
            "render_galleries",
            vec![
                group(),
                task("output/galleries/cats/index.html", "gallery.tmpl", "gallery_index", gallery.clone()),
                task("output/galleries/cats/rss.xml", "gallery.tmpl", "gallery_rss", gallery),
            ],
        );

        let filter = Filter::action("gallery_index");
        let nodes: Vec<TaskNode> = projector
            .project(&upstream, Some(&filter))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(nodes.len(), 1);
        assert_eq!(
            nodes[0].target,
            Utf8Path::new("output/spa/galleries/cats/index.html.json")
        );
    }

    #[test]
    fn test_filter_target_glob() {
        let filter = Filter::target_glob("output/posts/*.html").unwrap();
        let UpstreamNode::Task(inside) = entity_task("output/posts/hello.html") else {
            unreachable!()
        };
        let UpstreamNode::Task(nested) = entity_task("output/posts/2024/hello.html") else {
            unreachable!()
        };

        assert!(filter.matches(&inside));
        assert!(!filter.matches(&nested));
    }

    #[test]
    fn test_skip_fallback() {
        let projector = projector(settings(Utf8Path::new("output")))
            .with_shapes(ShapeTable::default().with_fallback(Fallback::Skip));

        let upstream = Upstream::new(
            "render_listings",
            vec![
                group(),
                task("output/listings/a.py.html", "listing.tmpl", "render_listing", RenderContext::new("en")),
            ],
        );

        assert_eq!(projector.project(&upstream, None).count(), 0);
    }

    #[test]
    fn test_action_writes_documents() {
        let dir = tempfile::tempdir().unwrap();
        let output = Utf8PathBuf::from_path_buf(dir.path().join("output")).unwrap();
        let projector = projector(settings(&output));

        let list = RenderContext::new("en")
            .with_posts(vec![post()])
            .with_extra("title", "Index");

        let upstream = Upstream::new(
            "render_indexes",
            vec![
                group(),
                task(output.join("index.html").as_str(), "index.tmpl", "render_index", list),
                entity_task(output.join("posts/hello.html").as_str()),
            ],
        );

        let nodes: Vec<TaskNode> = projector
            .project(&upstream, None)
            .collect::<Result<_, _>>()
            .unwrap();

        for node in &nodes {
            node.run().unwrap();
        }

        let index: Value =
            serde_json::from_str(&fs::read_to_string(output.join("spa/index.html.json")).unwrap()).unwrap();
        assert_eq!(index["id"], "/spa/index.html.json");
        assert_eq!(index["title"], "Index");
        assert_eq!(index["posts"][0]["id"], "/posts/hello.html.json");

        let entity: Value = serde_json::from_str(
            &fs::read_to_string(output.join("spa/posts/hello.html.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(entity["id"], "/posts/hello.html.json");
        assert_eq!(entity["text_stripped"], "hi");
    }

    #[test]
    fn test_action_reports_context_failure() {
        let projector = projector(settings(Utf8Path::new("output")));
        let upstream = Upstream::new(
            "render_posts",
            vec![
                group(),
                UpstreamNode::Task(UpstreamTask {
                    name: "broken".into(),
                    target: "output/posts/broken.html".into(),
                    file_deps: vec![],
                    fingerprint: Hash32::default(),
                    template: "post.tmpl".into(),
                    action: "render_page".into(),
                    context: Arc::new(|| -> anyhow::Result<RenderContext> {
                        Err(anyhow::anyhow!("no context"))
                    }),
                }),
            ],
        );

        let node = projector.project(&upstream, None).next().unwrap().unwrap();
        let err = node.run().unwrap_err();
        assert!(matches!(err, TaskError::Projection(ProjectionError::Context { .. })));
    }

    #[test]
    fn test_global_context_task() {
        let dir = tempfile::tempdir().unwrap();
        let output = Utf8PathBuf::from_path_buf(dir.path().join("output")).unwrap();
        let projector = projector(settings(&output));

        let mut extensions = Map::new();
        extensions.insert(
            CLIENT_TEMPLATES_KEY.into(),
            json!({ "post.tmpl": { "content": "post" }, "index.tmpl": { "content": "list" } }),
        );

        let node = projector.global_context_task(extensions.clone()).unwrap();
        assert_eq!(node.target, output.join("spa/global_context.json"));
        assert_eq!(
            node.file_deps,
            vec![
                Utf8PathBuf::from("templates/base.tmpl"),
                Utf8PathBuf::from("templates/index.tmpl"),
                Utf8PathBuf::from("templates/post.tmpl"),
            ]
        );

        let again = projector.global_context_task(extensions).unwrap();
        assert_eq!(node.fingerprint, again.fingerprint);

        node.run().unwrap();
        let written: Value =
            serde_json::from_str(&fs::read_to_string(&node.target).unwrap()).unwrap();
        assert_eq!(written["default_lang"], "en");
        assert_eq!(written["client_templates"]["post.tmpl"]["content"], "post");
    }
}
