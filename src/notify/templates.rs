use crate::models::VideoRecord;

const EXCERPT_CHARS: usize = 200;

/// A newly published long-form post to announce.
#[derive(Debug, Clone, Default)]
pub struct PostAnnouncement {
    pub title: String,
    pub url: String,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
}

impl PostAnnouncement {
    /// The explicit excerpt, or the first 200 characters of the content.
    pub fn excerpt(&self) -> String {
        if let Some(excerpt) = self.excerpt.as_deref().filter(|e| !e.trim().is_empty()) {
            return excerpt.to_string();
        }
        let content = self.content.as_deref().unwrap_or_default();
        let head: String = content.chars().take(EXCERPT_CHARS).collect();
        format!("{head}...")
    }
}

pub(crate) struct Rendered {
    pub subject: String,
    pub html: String,
}

pub(crate) fn video_update(video: &VideoRecord) -> Rendered {
    let title = escape_html(&video.title);
    let thumbnail = escape_html(&video.thumbnail_url);
    let watch_url = escape_html(&video.watch_url());

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>New YouTube Short!</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; background: #faf5ff;">
  <div style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <h1 style="text-align: center; color: #7c3aed; font-size: 32px; margin: 0 0 30px 0;">🎬 New Short Available!</h1>
    <div style="background: white; border-radius: 16px; overflow: hidden;">
      <img src="{thumbnail}" alt="{title}" style="width: 100%; height: auto; display: block;">
      <div style="padding: 30px;">
        <h2 style="color: #1f2937; font-size: 24px; margin: 0 0 15px 0;">{title}</h2>
        <p style="color: #6b7280; font-size: 16px; line-height: 1.6; margin: 0 0 25px 0;">Check out my latest YouTube Short! I think you'll love this one. 🎉</p>
        <a href="{watch_url}" style="display: inline-block; padding: 14px 32px; background: #7c3aed; color: white; text-decoration: none; border-radius: 9999px; font-weight: 600;">Watch Now →</a>
      </div>
    </div>
    <p style="text-align: center; color: #9ca3af; font-size: 14px; margin-top: 30px;">Thanks for subscribing! More amazing content coming soon.</p>
  </div>
</body>
</html>
"#
    );

    Rendered {
        subject: format!("🎬 New Short: {}", video.title),
        html,
    }
}

pub(crate) fn post_update(post: &PostAnnouncement) -> Rendered {
    let title = escape_html(&post.title);
    let excerpt = escape_html(&post.excerpt());
    let url = escape_html(&post.url);
    let image = post
        .image_url
        .as_deref()
        .map(|src| {
            format!(
                r#"<img src="{}" alt="{title}" style="width: 100%; height: auto; display: block;">"#,
                escape_html(src)
            )
        })
        .unwrap_or_default();

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>New Blog Post!</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; background: #ede9fe;">
  <div style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <h1 style="text-align: center; color: #7c3aed; font-size: 32px; margin: 0 0 30px 0;">✍️ Fresh Off the Press!</h1>
    <div style="background: white; border-radius: 16px; overflow: hidden;">
      {image}
      <div style="padding: 30px;">
        <span style="color: #7c3aed; font-size: 12px; font-weight: 600; text-transform: uppercase;">New Post</span>
        <h2 style="color: #1f2937; font-size: 24px; margin: 15px 0;">{title}</h2>
        <p style="color: #6b7280; font-size: 16px; line-height: 1.6; margin: 0 0 25px 0;">{excerpt}</p>
        <a href="{url}" style="display: inline-block; padding: 14px 32px; background: #a855f7; color: white; text-decoration: none; border-radius: 9999px; font-weight: 600;">Read Article →</a>
      </div>
    </div>
    <p style="text-align: center; color: #9ca3af; font-size: 14px; margin-top: 30px;">Stay tuned for more updates and stories!</p>
  </div>
</body>
</html>
"#
    );

    Rendered {
        subject: format!("✍️ New Post: {}", post.title),
        html,
    }
}

/// Inserts a footer with a per-recipient unsubscribe link before `</body>`,
/// or appends it when the document has no body tag.
pub(crate) fn with_unsubscribe_link(html: &str, site_url: &str, email: &str) -> String {
    let unsubscribe_url = format!(
        "{}/unsubscribe?email={}",
        site_url.trim_end_matches('/'),
        urlencoding::encode(email)
    );
    let footer = format!(
        r#"<div style="margin-top: 40px; padding-top: 20px; border-top: 1px solid #e5e7eb; text-align: center;">
  <p style="color: #9ca3af; font-size: 12px; margin: 0;">Don't want these emails? <a href="{}" style="color: #8b5cf6;">Unsubscribe</a></p>
</div>
"#,
        escape_html(&unsubscribe_url)
    );

    match html.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + footer.len());
            out.push_str(&html[..pos]);
            out.push_str(&footer);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{footer}"),
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn video(title: &str) -> VideoRecord {
        VideoRecord {
            id: 1,
            external_id: "abc123".to_string(),
            title: title.to_string(),
            description: String::new(),
            thumbnail_url: "https://i.ytimg.com/vi/abc123/mqdefault.jpg".to_string(),
            published_at: Utc::now(),
            is_visible: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_video_update_links_to_watch_page() {
        let rendered = video_update(&video("Tips & <Tricks>"));
        assert_eq!(rendered.subject, "🎬 New Short: Tips & <Tricks>");
        assert!(rendered.html.contains("https://www.youtube.com/watch?v=abc123"));
        assert!(rendered.html.contains("Tips &amp; &lt;Tricks&gt;"));
        assert!(!rendered.html.contains("<Tricks>"));
    }

    #[test]
    fn test_unsubscribe_link_is_per_recipient() {
        let html = "<html><body><p>hi</p></body></html>";
        let out = with_unsubscribe_link(html, "https://site.example/", "a+b@x.io");

        assert!(out.contains("https://site.example/unsubscribe?email=a%2Bb%40x.io"));
        let footer_at = out.find("Unsubscribe").unwrap();
        assert!(footer_at < out.find("</body>").unwrap());
        assert!(out.ends_with("</body></html>"));
    }

    #[test]
    fn test_unsubscribe_link_without_body_tag() {
        let out = with_unsubscribe_link("<p>plain</p>", "https://site.example", "a@x.io");
        assert!(out.starts_with("<p>plain</p>"));
        assert!(out.contains("unsubscribe?email=a%40x.io"));
    }

    #[test]
    fn test_post_excerpt_fallback() {
        let post = PostAnnouncement {
            title: "Long read".to_string(),
            url: "https://site.example/blog/long-read".to_string(),
            content: Some("é".repeat(250)),
            ..PostAnnouncement::default()
        };
        let excerpt = post.excerpt();
        assert_eq!(excerpt.chars().count(), 203);
        assert!(excerpt.ends_with("..."));

        let explicit = PostAnnouncement {
            excerpt: Some("Short and sweet".to_string()),
            ..post
        };
        assert_eq!(explicit.excerpt(), "Short and sweet");
    }

    #[test]
    fn test_post_update_optional_image() {
        let post = PostAnnouncement {
            title: "Hello".to_string(),
            url: "https://site.example/blog/hello".to_string(),
            excerpt: Some("Intro".to_string()),
            ..PostAnnouncement::default()
        };
        let without = post_update(&post);
        assert!(!without.html.contains("<img"));
        assert_eq!(without.subject, "✍️ New Post: Hello");

        let with = post_update(&PostAnnouncement {
            image_url: Some("https://cdn.example/cover.png".to_string()),
            ..post
        });
        assert!(with.html.contains(r#"src="https://cdn.example/cover.png""#));
    }
}
