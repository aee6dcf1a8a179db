use minijinja::{Environment, Value};

const SOURCES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../templates/base.html")),
    ("home.html", include_str!("../../templates/home.html")),
    ("about.html", include_str!("../../templates/about.html")),
    ("resources.html", include_str!("../../templates/resources.html")),
    ("feedback.html", include_str!("../../templates/feedback.html")),
    ("vets.html", include_str!("../../templates/vets.html")),
    ("exercise_breathing.html", include_str!("../../templates/exercise_breathing.html")),
    ("exercise_grounding.html", include_str!("../../templates/exercise_grounding.html")),
    ("exercise_sleep.html", include_str!("../../templates/exercise_sleep.html")),
    ("signup.html", include_str!("../../templates/signup.html")),
    ("login.html", include_str!("../../templates/login.html")),
    ("password_change.html", include_str!("../../templates/password_change.html")),
    ("password_change_done.html", include_str!("../../templates/password_change_done.html")),
    ("profile.html", include_str!("../../templates/profile.html")),
    ("chat.html", include_str!("../../templates/chat.html")),
    ("mood_dashboard.html", include_str!("../../templates/mood_dashboard.html")),
];

/// Compiled page templates, embedded in the binary.
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn load() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        for (name, source) in SOURCES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    pub fn render(&self, name: &str, ctx: Value) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(ctx)
    }
}
