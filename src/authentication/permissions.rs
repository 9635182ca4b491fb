use crate::{jwt::SessionData, schema::UserRole};

const ACTION_TABLE: &[(UserRole, &[ActionType])] = &[
    (
        UserRole::User,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnLists,
        ],
    ),
    (
        UserRole::Admin,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnLists,
            ActionType::ManageAllRecipes,
            ActionType::ManageCatalog,
            ActionType::ManageUsers,
        ],
    ),
];

#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum ActionType {
    CreateRecipes,

    /// Favorites, shopping cart and subscriptions.
    ManageOwnLists,
    ManageOwnRecipes,

    ManageAllRecipes,
    /// Tags and ingredients.
    ManageCatalog,
    ManageUsers,
}

impl ActionType {
    pub fn authenticate(self, session: &SessionData) -> bool {
        ACTION_TABLE
            .iter()
            .find(|(role, _)| role == &session.role)
            .map(|(_, actions)| actions.contains(&self))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: UserRole) -> SessionData {
        SessionData {
            user_id: 1,
            username: String::from("cook"),
            is_admin: role == UserRole::Admin,
            role,
        }
    }

    #[test]
    fn users_manage_only_their_own_things() {
        let user = session(UserRole::User);

        assert!(ActionType::ManageOwnLists.authenticate(&user));
        assert!(ActionType::CreateRecipes.authenticate(&user));
        assert!(!ActionType::ManageAllRecipes.authenticate(&user));
        assert!(!ActionType::ManageCatalog.authenticate(&user));
    }

    #[test]
    fn admins_can_do_everything() {
        let admin = session(UserRole::Admin);

        for action in [
            ActionType::CreateRecipes,
            ActionType::ManageOwnLists,
            ActionType::ManageOwnRecipes,
            ActionType::ManageAllRecipes,
            ActionType::ManageCatalog,
            ActionType::ManageUsers,
        ] {
            assert!(action.authenticate(&admin), "{action:?}");
        }
    }

    #[test]
    fn owners_bypass_the_action_table() {
        let user = session(UserRole::User);

        assert!(user
            .authenticate_owner(1, ActionType::ManageAllRecipes)
            .is_ok());
        assert!(user
            .authenticate_owner(2, ActionType::ManageAllRecipes)
            .is_err());
    }
}
