use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single grantable capability, expressed as `resource:action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Permission {
    pub resource: &'static str,
    pub action: &'static str,
}

impl Permission {
    pub const fn new(resource: &'static str, action: &'static str) -> Self {
        Self { resource, action }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }
}

/// Permissions grouped by dashboard domain, as surfaced to access-check consumers.
#[derive(Debug, Serialize)]
pub struct PermissionGroup {
    pub domain: &'static str,
    pub permissions: &'static [Permission],
}

pub const CATALOG: &[PermissionGroup] = &[
    PermissionGroup {
        domain: "appointments",
        permissions: &[
            Permission::new("appointments", "read"),
            Permission::new("appointments", "create"),
            Permission::new("appointments", "update"),
            Permission::new("appointments", "transition"),
        ],
    },
    PermissionGroup {
        domain: "patients",
        permissions: &[
            Permission::new("customers", "read"),
            Permission::new("customers", "create"),
            Permission::new("customers", "update"),
            Permission::new("customers", "delete"),
            Permission::new("pets", "read"),
            Permission::new("pets", "create"),
            Permission::new("pets", "update"),
            Permission::new("pets", "delete"),
        ],
    },
    PermissionGroup {
        domain: "clinical",
        permissions: &[
            Permission::new("procedures", "read"),
            Permission::new("procedures", "create"),
            Permission::new("procedures", "update"),
            Permission::new("procedures", "delete"),
            Permission::new("treatment_plans", "read"),
            Permission::new("treatment_plans", "create"),
            Permission::new("treatment_plans", "update"),
            Permission::new("treatment_plans", "transition"),
            Permission::new("treatment_plans", "checkout"),
        ],
    },
    PermissionGroup {
        domain: "sales",
        permissions: &[
            Permission::new("orders", "read"),
            Permission::new("orders", "create"),
            Permission::new("orders", "cancel"),
            Permission::new("payments", "read"),
            Permission::new("payments", "create"),
        ],
    },
    PermissionGroup {
        domain: "inventory",
        permissions: &[
            Permission::new("products", "read"),
            Permission::new("products", "create"),
            Permission::new("products", "update"),
            Permission::new("products", "delete"),
            Permission::new("product_units", "read"),
            Permission::new("product_units", "create"),
            Permission::new("product_units", "update"),
            Permission::new("product_units", "delete"),
            Permission::new("stock_movements", "read"),
            Permission::new("stock_movements", "create"),
        ],
    },
    PermissionGroup {
        domain: "partners",
        permissions: &[
            Permission::new("suppliers", "read"),
            Permission::new("suppliers", "create"),
            Permission::new("suppliers", "update"),
            Permission::new("suppliers", "delete"),
            Permission::new("brands", "read"),
            Permission::new("brands", "create"),
            Permission::new("brands", "update"),
            Permission::new("brands", "delete"),
        ],
    },
    PermissionGroup {
        domain: "staff",
        permissions: &[
            Permission::new("staff", "read"),
            Permission::new("staff", "create"),
            Permission::new("staff", "update"),
            Permission::new("staff", "deactivate"),
            Permission::new("specialties", "read"),
            Permission::new("specialties", "create"),
            Permission::new("specialties", "update"),
            Permission::new("specialties", "delete"),
        ],
    },
    PermissionGroup {
        domain: "settings",
        permissions: &[
            Permission::new("tenant_settings", "read"),
            Permission::new("tenant_settings", "update"),
        ],
    },
    PermissionGroup {
        domain: "imports",
        permissions: &[
            Permission::new("imports", "preview"),
            Permission::new("imports", "commit"),
        ],
    },
];

/// True when `resource:action` exists somewhere in the catalog.
pub fn is_declared(resource: &str, action: &str) -> bool {
    CATALOG.iter().any(|group| {
        group
            .permissions
            .iter()
            .any(|p| p.resource == resource && p.action == action)
    })
}

const VETERINARIAN_PERMISSIONS: &[Permission] = &[
    Permission::new("appointments", "read"),
    Permission::new("appointments", "create"),
    Permission::new("appointments", "update"),
    Permission::new("appointments", "transition"),
    Permission::new("customers", "read"),
    Permission::new("customers", "create"),
    Permission::new("customers", "update"),
    Permission::new("pets", "read"),
    Permission::new("pets", "create"),
    Permission::new("pets", "update"),
    Permission::new("pets", "delete"),
    Permission::new("procedures", "read"),
    Permission::new("treatment_plans", "read"),
    Permission::new("treatment_plans", "create"),
    Permission::new("treatment_plans", "update"),
    Permission::new("treatment_plans", "transition"),
    Permission::new("treatment_plans", "checkout"),
    Permission::new("orders", "read"),
    Permission::new("payments", "read"),
    Permission::new("products", "read"),
    Permission::new("specialties", "read"),
];

const RECEPTIONIST_PERMISSIONS: &[Permission] = &[
    Permission::new("appointments", "read"),
    Permission::new("appointments", "create"),
    Permission::new("appointments", "update"),
    Permission::new("appointments", "transition"),
    Permission::new("customers", "read"),
    Permission::new("customers", "create"),
    Permission::new("customers", "update"),
    Permission::new("pets", "read"),
    Permission::new("pets", "create"),
    Permission::new("pets", "update"),
    Permission::new("procedures", "read"),
    Permission::new("treatment_plans", "read"),
    Permission::new("orders", "read"),
    Permission::new("orders", "create"),
    Permission::new("orders", "cancel"),
    Permission::new("payments", "read"),
    Permission::new("payments", "create"),
    Permission::new("products", "read"),
    Permission::new("specialties", "read"),
    Permission::new("staff", "read"),
];

const INVENTORY_MANAGER_PERMISSIONS: &[Permission] = &[
    Permission::new("products", "read"),
    Permission::new("products", "create"),
    Permission::new("products", "update"),
    Permission::new("products", "delete"),
    Permission::new("product_units", "read"),
    Permission::new("product_units", "create"),
    Permission::new("product_units", "update"),
    Permission::new("product_units", "delete"),
    Permission::new("stock_movements", "read"),
    Permission::new("stock_movements", "create"),
    Permission::new("suppliers", "read"),
    Permission::new("suppliers", "create"),
    Permission::new("suppliers", "update"),
    Permission::new("suppliers", "delete"),
    Permission::new("brands", "read"),
    Permission::new("brands", "create"),
    Permission::new("brands", "update"),
    Permission::new("brands", "delete"),
    Permission::new("orders", "read"),
    Permission::new("imports", "preview"),
    Permission::new("imports", "commit"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Veterinarian,
    Receptionist,
    InventoryManager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Veterinarian => "veterinarian",
            Role::Receptionist => "receptionist",
            Role::InventoryManager => "inventory_manager",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "veterinarian" => Some(Role::Veterinarian),
            "receptionist" => Some(Role::Receptionist),
            "inventory_manager" => Some(Role::InventoryManager),
            _ => None,
        }
    }

    fn grants(&self) -> Option<&'static [Permission]> {
        match self {
            Role::Admin => None,
            Role::Veterinarian => Some(VETERINARIAN_PERMISSIONS),
            Role::Receptionist => Some(RECEPTIONIST_PERMISSIONS),
            Role::InventoryManager => Some(INVENTORY_MANAGER_PERMISSIONS),
        }
    }

    /// Admin holds every declared permission; other roles a fixed subset.
    /// Undeclared permissions are denied for everyone, admin included.
    pub fn allows(&self, resource: &str, action: &str) -> bool {
        if !is_declared(resource, action) {
            return false;
        }
        match self.grants() {
            None => true,
            Some(granted) => granted
                .iter()
                .any(|p| p.resource == resource && p.action == action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_holds_every_declared_permission() {
        for group in CATALOG {
            for permission in group.permissions {
                assert!(
                    Role::Admin.allows(permission.resource, permission.action),
                    "admin missing {}",
                    permission.key()
                );
            }
        }
    }

    #[test]
    fn test_undeclared_permission_denied_for_everyone() {
        assert!(!Role::Admin.allows("orders", "explode"));
        assert!(!Role::Receptionist.allows("nonexistent", "read"));
    }

    #[test]
    fn test_role_grants_are_declared_in_catalog() {
        for role in [
            Role::Veterinarian,
            Role::Receptionist,
            Role::InventoryManager,
        ] {
            for permission in role.grants().unwrap() {
                assert!(
                    is_declared(permission.resource, permission.action),
                    "{} grants undeclared {}",
                    role.as_str(),
                    permission.key()
                );
            }
        }
    }

    #[test]
    fn test_veterinarian_cannot_manage_staff() {
        assert!(!Role::Veterinarian.allows("staff", "create"));
        assert!(!Role::Veterinarian.allows("staff", "deactivate"));
        assert!(Role::Veterinarian.allows("treatment_plans", "checkout"));
    }

    #[test]
    fn test_receptionist_runs_pos_but_not_inventory() {
        assert!(Role::Receptionist.allows("payments", "create"));
        assert!(Role::Receptionist.allows("orders", "cancel"));
        assert!(!Role::Receptionist.allows("stock_movements", "create"));
        assert!(!Role::Receptionist.allows("tenant_settings", "update"));
    }

    #[test]
    fn test_inventory_manager_runs_imports() {
        assert!(Role::InventoryManager.allows("imports", "commit"));
        assert!(!Role::InventoryManager.allows("appointments", "create"));
    }

    #[test]
    fn test_role_round_trips_through_strings() {
        for role in [
            Role::Admin,
            Role::Veterinarian,
            Role::Receptionist,
            Role::InventoryManager,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("janitor"), None);
    }
}
