//! Glue binding the well-known generators of the host to projections.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::document::DocumentBuilder;
use crate::error::ProjectionError;
use crate::plan::Plan;
use crate::projection::{CLIENT_TEMPLATES_KEY, Filter, Projector, ShapeTable, TaskGenerator};

/// Client views by template identifier, then by slot name.
pub type ClientTemplates = BTreeMap<String, BTreeMap<String, String>>;

/// An upstream generator whose tasks are projected.
#[derive(Clone)]
pub struct Binding {
    pub generator: String,
    pub filter: Option<Filter>,
}

/// Produces the JSON twin of the rendered site.
#[derive(Clone)]
pub struct SpaPlugin {
    bindings: Vec<Binding>,
    client_templates: ClientTemplates,
    shapes: ShapeTable,
}

impl Default for SpaPlugin {
    fn default() -> Self {
        Self::empty()
            .bind("render_posts", None)
            .bind("render_pages", None)
            .bind("render_indexes", None)
            .bind("render_tags", None)
            .bind("render_archive", None)
            .bind("render_galleries", Some(Filter::action("gallery_index")))
    }
}

impl SpaPlugin {
    /// Basename of every projected task.
    pub const NAME: &'static str = "render_spa";

    pub fn new() -> Self {
        Self::default()
    }

    /// A plugin without any bindings.
    pub fn empty() -> Self {
        Self {
            bindings: Vec::new(),
            client_templates: ClientTemplates::new(),
            shapes: ShapeTable::default(),
        }
    }

    pub fn bind(mut self, generator: impl Into<String>, filter: Option<Filter>) -> Self {
        self.bindings.push(Binding {
            generator: generator.into(),
            filter,
        });
        self
    }

    pub fn with_client_templates(mut self, client_templates: ClientTemplates) -> Self {
        self.client_templates = client_templates;
        self
    }

    pub fn with_shapes(mut self, shapes: ShapeTable) -> Self {
        self.shapes = shapes;
        self
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn client_templates(&self) -> &ClientTemplates {
        &self.client_templates
    }

    /// Projects every bound generator found in `generators` and adds the
    /// global context task. Bindings without a matching generator are skipped.
    pub fn gen_tasks(
        &self,
        builder: DocumentBuilder,
        generators: &[&dyn TaskGenerator],
    ) -> Result<Plan, ProjectionError> {
        let projector = Projector::new(Self::NAME, builder)?.with_shapes(self.shapes.clone());
        let mut plan = Plan::new();

        for binding in &self.bindings {
            let Some(generator) = generators
                .iter()
                .find(|generator| generator.name() == binding.generator)
            else {
                debug!(generator = %binding.generator, "generator not present, skipping");
                continue;
            };

            for node in projector.project(*generator, binding.filter.as_ref()) {
                plan.push(node?);
            }
        }

        let mut extensions = Map::new();
        extensions.insert(CLIENT_TEMPLATES_KEY.into(), self.manifest());
        plan.push(projector.global_context_task(extensions)?);

        plan.validate()?;

        info!(tasks = plan.len(), "projected JSON tasks");

        Ok(plan)
    }

    fn manifest(&self) -> Value {
        let manifest = self
            .client_templates
            .iter()
            .map(|(template, slots)| {
                let slots = slots
                    .iter()
                    .map(|(slot, view)| (slot.clone(), Value::String(view.clone())))
                    .collect();
                (template.clone(), Value::Object(slots))
            })
            .collect();

        Value::Object(manifest)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use camino::{Utf8Path, Utf8PathBuf};
    use chrono::DateTime;

    use super::*;
    use crate::config::Settings;
    use crate::core::Hash32;
    use crate::document::DocumentCache;
    use crate::projection::{Gallery, RenderContext, UpstreamNode, UpstreamTask};
    use crate::site::{Localized, PatternResolver, Post, Site, TemplateDeps};

    struct Generator {
        name: &'static str,
        tasks: Vec<(&'static str, &'static str, &'static str)>,
    }

    impl TaskGenerator for Generator {
        fn name(&self) -> &str {
            self.name
        }

        fn gen_tasks(&self) -> Box<dyn Iterator<Item = UpstreamNode> + '_> {
            let group = UpstreamNode::Group {
                name: self.name.into(),
            };

            let tasks = self.tasks.iter().map(|&(target, template, action)| {
                let date = DateTime::parse_from_rfc3339("2024-05-01T12:00:00+00:00").unwrap();
                let post = Arc::new(Post::new("posts/a.md", "post.tmpl", date).with_locale(
                    "en",
                    Localized {
                        title: "A".into(),
                        permalink: "/posts/a.html".into(),
                        ..Default::default()
                    },
                ));
                let context = RenderContext::new("en")
                    .with_post(post.clone())
                    .with_posts(vec![post])
                    .with_gallery(Gallery::default());

                UpstreamNode::Task(UpstreamTask {
                    name: target.into(),
                    target: target.into(),
                    file_deps: vec![],
                    fingerprint: Hash32::hash(target),
                    template: template.into(),
                    action: action.into(),
                    context: Arc::new(move || -> anyhow::Result<RenderContext> { Ok(context.clone()) }),
                })
            });

            Box::new(std::iter::once(group).chain(tasks))
        }
    }

    struct Templates;

    impl TemplateDeps for Templates {
        fn template_deps(&self, name: &str) -> Vec<Utf8PathBuf> {
            vec![Utf8PathBuf::from(format!("templates/{name}"))]
        }
    }

    fn builder() -> DocumentBuilder {
        let site = Site::new(Settings::default(), Arc::new(PatternResolver::new("en")))
            .with_templates(Arc::new(Templates));
        DocumentBuilder::new(Arc::new(site), Arc::new(DocumentCache::new()))
    }

    fn posts() -> Generator {
        Generator {
            name: "render_posts",
            tasks: vec![("output/posts/a.html", "post.tmpl", "render_page")],
        }
    }

    fn galleries() -> Generator {
        Generator {
            name: "render_galleries",
            tasks: vec![
                ("output/galleries/cats/index.html", "gallery.tmpl", "gallery_index"),
                ("output/galleries/cats/rss.xml", "gallery.tmpl", "gallery_rss"),
            ],
        }
    }

    fn targets(plan: &Plan) -> Vec<&Utf8Path> {
        plan.nodes().iter().map(|node| node.target.as_path()).collect()
    }

    #[test]
    fn test_default_bindings() {
        let plugin = SpaPlugin::new();
        let names: Vec<&str> = plugin
            .bindings()
            .iter()
            .map(|binding| binding.generator.as_str())
            .collect();

        assert_eq!(
            names,
            [
                "render_posts",
                "render_pages",
                "render_indexes",
                "render_tags",
                "render_archive",
                "render_galleries"
            ]
        );
    }

    #[test]
    fn test_gen_tasks() {
        let mut client_templates = ClientTemplates::new();
        client_templates.insert(
            "post.tmpl".into(),
            BTreeMap::from([("content".to_string(), "post-view".to_string())]),
        );

        let plugin = SpaPlugin::new().with_client_templates(client_templates);
        let (posts, galleries) = (posts(), galleries());

        let plan = plugin.gen_tasks(builder(), &[&posts, &galleries]).unwrap();

        assert_eq!(
            targets(&plan),
            [
                Utf8Path::new("output/spa/posts/a.html.json"),
                Utf8Path::new("output/spa/galleries/cats/index.html.json"),
                Utf8Path::new("output/spa/global_context.json"),
            ]
        );

        let global = plan.nodes().last().unwrap();
        assert_eq!(global.file_deps, vec![Utf8PathBuf::from("templates/post.tmpl")]);
        assert!(plan.nodes().iter().all(|node| node.basename == SpaPlugin::NAME));
    }

    #[test]
    fn test_gen_tasks_without_generators() {
        let plan = SpaPlugin::new().gen_tasks(builder(), &[]).unwrap();
        assert_eq!(targets(&plan), [Utf8Path::new("output/spa/global_context.json")]);
    }

    #[test]
    fn test_gen_tasks_rejects_duplicates() {
        let plugin = SpaPlugin::empty()
            .bind("render_posts", None)
            .bind("render_posts", None);
        let posts = posts();

        let err = plugin.gen_tasks(builder(), &[&posts]).unwrap_err();
        assert!(matches!(err, ProjectionError::DuplicateTarget(_)));
    }
}
