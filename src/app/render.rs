//! Usage: Terminal rendering of the signed-in user's profile (text or JSON view).

use crate::oauth::profile::UserProfile;
use serde::Serialize;

pub(crate) const LOADING_PLACEHOLDER: &str = "Loading...";
pub(crate) const NO_IMAGE: &str = "no image";

/// Flattened profile fields shown to the user; `--json` prints this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileView {
    pub(crate) display_name: String,
    pub(crate) id: String,
    pub(crate) email: Option<String>,
    pub(crate) uri: String,
    pub(crate) uri_link: Option<String>,
    pub(crate) link: String,
    pub(crate) image_url: Option<String>,
    pub(crate) followers: u64,
}

impl ProfileView {
    pub(crate) fn from_profile(profile: &UserProfile) -> Self {
        let display_name = profile
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(profile.id.as_str())
            .to_string();
        Self {
            display_name,
            id: profile.id.clone(),
            email: profile.email.clone(),
            uri: profile.uri.clone(),
            uri_link: profile.external_urls.spotify.clone(),
            link: profile.href.clone(),
            image_url: profile.primary_image().map(|img| img.url.clone()),
            followers: profile.followers.total,
        }
    }
}

pub fn render_profile(profile: Option<&UserProfile>) -> String {
    let Some(profile) = profile else {
        return LOADING_PLACEHOLDER.to_string();
    };
    let view = ProfileView::from_profile(profile);
    let image = view.image_url.as_deref().unwrap_or(NO_IMAGE);

    let mut out = String::new();
    out.push_str("Display your Spotify profile data\n");
    out.push_str(&format!("Logged in as {}\n", view.display_name));
    out.push_str(&format!("Avatar: {image}\n"));
    out.push_str(&format!("  User ID: {}\n", view.id));
    out.push_str(&format!("  Email: {}\n", view.email.as_deref().unwrap_or("-")));
    match view.uri_link.as_deref() {
        Some(link) => out.push_str(&format!("  Spotify URI: {} ({link})\n", view.uri)),
        None => out.push_str(&format!("  Spotify URI: {}\n", view.uri)),
    }
    out.push_str(&format!("  Link: {}\n", view.link));
    out.push_str(&format!("  Profile Image: {image}\n"));
    out
}

pub(crate) fn render_profile_json(profile: &UserProfile) -> String {
    serde_json::to_string_pretty(&ProfileView::from_profile(profile))
        .unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::profile::{ExternalUrls, Image};

    fn profile() -> UserProfile {
        UserProfile {
            id: "jane".to_string(),
            display_name: Some("Jane".to_string()),
            email: Some("jane@example.com".to_string()),
            uri: "spotify:user:jane".to_string(),
            href: "https://api.spotify.com/v1/users/jane".to_string(),
            external_urls: ExternalUrls {
                spotify: Some("https://open.spotify.com/user/jane".to_string()),
            },
            images: vec![Image {
                url: "https://i.scdn.co/image/abc".to_string(),
                height: Some(64),
                width: Some(64),
            }],
            ..UserProfile::default()
        }
    }

    #[test]
    fn no_profile_renders_loading_placeholder() {
        assert_eq!(render_profile(None), "Loading...");
    }

    #[test]
    fn renders_identity_fields_and_avatar() {
        let text = render_profile(Some(&profile()));
        assert!(text.contains("Logged in as Jane\n"));
        assert!(text.contains("Avatar: https://i.scdn.co/image/abc\n"));
        assert!(text.contains("User ID: jane\n"));
        assert!(text.contains("Email: jane@example.com\n"));
        assert!(text.contains("Spotify URI: spotify:user:jane (https://open.spotify.com/user/jane)\n"));
        assert!(text.contains("Link: https://api.spotify.com/v1/users/jane\n"));
        assert!(text.contains("Profile Image: https://i.scdn.co/image/abc\n"));
    }

    #[test]
    fn empty_image_list_falls_back_to_no_image() {
        let mut p = profile();
        p.images.clear();
        let text = render_profile(Some(&p));
        assert!(text.contains("Avatar: no image\n"));
        assert!(text.contains("Profile Image: no image\n"));
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let mut p = profile();
        p.display_name = None;
        assert_eq!(ProfileView::from_profile(&p).display_name, "jane");
    }

    #[test]
    fn json_view_uses_camel_case() {
        let json: serde_json::Value =
            serde_json::from_str(&render_profile_json(&profile())).expect("json");
        assert_eq!(json["displayName"], "Jane");
        assert_eq!(json["imageUrl"], "https://i.scdn.co/image/abc");
    }
}
