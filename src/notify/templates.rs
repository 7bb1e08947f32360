use tera::{Context, Tera};

use super::Notification;
use super::mailer::Email;
use crate::error::IntegrationError;

const TEMPLATES: &[(&str, &str)] = &[
    ("layout.html", include_str!("../../templates/emails/layout.html")),
    (
        "request_created.html",
        include_str!("../../templates/emails/request_created.html"),
    ),
    (
        "review_created.html",
        include_str!("../../templates/emails/review_created.html"),
    ),
    (
        "review_evaluated.html",
        include_str!("../../templates/emails/review_evaluated.html"),
    ),
    (
        "book_available.html",
        include_str!("../../templates/emails/book_available.html"),
    ),
    (
        "due_tomorrow.html",
        include_str!("../../templates/emails/due_tomorrow.html"),
    ),
    ("cart_help.html", include_str!("../../templates/emails/cart_help.html")),
];

/// Email bodies compiled into the binary.
pub struct Templates {
    tera: Tera,
    app_name: String,
    public_url: String,
}

impl Templates {
    pub fn new(app_name: &str, public_url: &str) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())?;
        Ok(Self {
            tera,
            app_name: app_name.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn render(&self, notification: &Notification) -> Result<Email, IntegrationError> {
        let mut ctx = Context::from_serialize(notification)?;
        ctx.insert("app_name", &self.app_name);
        ctx.insert("public_url", &self.public_url);
        let html = self.tera.render(notification.template(), &ctx)?;
        let to = notification.addressee();
        Ok(Email {
            to: to.email.clone(),
            to_name: to.name.clone(),
            subject: notification.subject(),
            html,
        })
    }
}
