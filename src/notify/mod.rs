mod fanout;
mod mailer;
mod templates;

pub use fanout::Notifier;
pub use mailer::build_mailer;
pub use templates::PostAnnouncement;

#[cfg(test)]
pub use mailer::testing;
