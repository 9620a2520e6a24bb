use serde::{Deserialize, Serialize};

use crate::models::Profile;

// -- Profile settings --

/// Fields a user may change from the settings page. `None` keeps the
/// current value; id, email, user type and creation time are immutable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub skills: Option<Vec<String>>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Shallow merge into `profile`.
    pub fn apply_to(self, profile: &mut Profile) {
        if let Some(name) = self.name {
            profile.name = name;
        }
        if let Some(specialty) = self.specialty {
            profile.specialty = Some(specialty);
        }
        if let Some(bio) = self.bio {
            profile.bio = Some(bio);
        }
        if let Some(avatar) = self.avatar {
            profile.avatar = Some(avatar);
        }
        if let Some(skills) = self.skills {
            profile.skills = Some(skills);
        }
    }
}
