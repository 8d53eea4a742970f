/*!
# RediBoard DevKit - Stubs et utilitaires de test

Bibliothèque facilitant les tests du kernel sans vraie flotte Redis :
- Faux serveur Redis scriptable (AUTH, CONFIG GET, INFO) sur une socket locale
- Builder de rapports INFO réalistes (master, replica, formats 2.6 et modernes)
*/

pub mod redis_stub;
pub mod test_utils;

pub use redis_stub::FakeRedis;
pub use test_utils::{init_test_logging, InfoBuilder};
