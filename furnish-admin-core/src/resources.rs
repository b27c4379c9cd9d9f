//! The admin collections of the site back-office.

use crate::controller::{BindingOptions, UpdateMethod};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminResource {
    Products,
    Banners,
    News,
    CsrPosts,
    Users,
    Roles,
    Contacts,
}

impl AdminResource {
    pub fn all() -> Vec<AdminResource> {
        vec![
            AdminResource::Products,
            AdminResource::Banners,
            AdminResource::News,
            AdminResource::CsrPosts,
            AdminResource::Users,
            AdminResource::Roles,
            AdminResource::Contacts,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            AdminResource::Products => "products",
            AdminResource::Banners => "banners",
            AdminResource::News => "news",
            AdminResource::CsrPosts => "csr",
            AdminResource::Users => "users",
            AdminResource::Roles => "roles",
            AdminResource::Contacts => "contacts",
        }
    }

    pub fn endpoint(&self) -> String {
        format!("/{}", self.name())
    }

    /// Banner updates are only routed for POST on the backend.
    pub fn update_method(&self) -> UpdateMethod {
        match self {
            AdminResource::Banners => UpdateMethod::Post,
            _ => UpdateMethod::Put,
        }
    }

    pub fn binding_options(&self) -> BindingOptions {
        BindingOptions::default().with_update_method(self.update_method())
    }
}

impl fmt::Display for AdminResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for AdminResource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('/').to_lowercase();
        AdminResource::all()
            .into_iter()
            .find(|resource| {
                resource.name() == wanted
                    || (wanted == "csr-posts" && *resource == AdminResource::CsrPosts)
            })
            .ok_or_else(|| {
                let names: Vec<&str> = AdminResource::all().iter().map(|r| r.name()).collect();
                format!("Unknown resource '{}', expected one of: {}", s, names.join(", "))
            })
    }
}
